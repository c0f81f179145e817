//! Provider-agnostic answer generation.
//!
//! `AnswerClient` is a closed set of three backends chosen once from
//! [`ProviderSettings`]. Construction validates the provider and its
//! credential before any network activity; `answer` is synchronous and
//! returns the trimmed model output.

mod completions;
mod groq;
mod ollama;
mod openai;
pub mod retry;
pub mod transport;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use groq::{GroqBackend, GROQ_CHAT_COMPLETIONS_URL};
pub use ollama::OllamaBackend;
pub use openai::{OpenAiBackend, OPENAI_CHAT_COMPLETIONS_URL};
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use transport::{HttpReply, HttpTransport, ReqwestTransport, TransportError, REQUEST_TIMEOUT};

use crate::error::ProviderError;
use crate::prompt::Prompt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Managed chat-completion service (OpenAI).
    CloudChat,
    /// Self-hosted HTTP inference server (Ollama).
    LocalHttp,
    /// Cloud REST completion service (Groq).
    CloudRest,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::CloudChat => "cloud-chat",
            ProviderKind::LocalHttp => "local-http",
            ProviderKind::CloudRest => "cloud-rest",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cloud-chat" | "openai" => Ok(ProviderKind::CloudChat),
            "local-http" | "ollama" => Ok(ProviderKind::LocalHttp),
            "cloud-rest" | "groq" => Ok(ProviderKind::CloudRest),
            _ => Err(ProviderError::Configuration(format!(
                "unsupported provider: {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub provider: ProviderKind,
    pub model: String,
    pub temperature: f64,
    /// Zero leaves the limit to the backend.
    pub max_output_tokens: u32,
    /// Only used by the local-http backend.
    pub base_url: String,
    /// `None` falls back to the built-in spoiler-avoidance instruction.
    pub system_prompt: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::CloudChat,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.4,
            max_output_tokens: 350,
            base_url: "http://localhost:11434".to_string(),
            system_prompt: None,
        }
    }
}

impl ProviderSettings {
    pub fn for_provider(name: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            provider: name.parse()?,
            ..Self::default()
        })
    }
}

/// API keys resolved once by the caller. Backends never read the environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |key: &Option<String>| if key.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("openai_api_key", &mask(&self.openai_api_key))
            .field("groq_api_key", &mask(&self.groq_api_key))
            .finish()
    }
}

#[derive(Clone)]
pub enum AnswerClient {
    CloudChat(OpenAiBackend),
    LocalHttp(OllamaBackend),
    CloudRest(GroqBackend),
}

impl AnswerClient {
    pub fn new(settings: &ProviderSettings, credentials: &Credentials) -> Result<Self, ProviderError> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(REQUEST_TIMEOUT)?);
        Self::with_transport(settings, credentials, transport, Arc::new(ThreadSleeper))
    }

    pub fn with_transport(
        settings: &ProviderSettings,
        credentials: &Credentials,
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Result<Self, ProviderError> {
        let client = match settings.provider {
            ProviderKind::CloudChat => AnswerClient::CloudChat(OpenAiBackend::new(
                settings,
                credentials.openai_api_key.as_deref(),
                transport,
            )?),
            ProviderKind::LocalHttp => {
                AnswerClient::LocalHttp(OllamaBackend::new(settings, transport, sleeper))
            }
            ProviderKind::CloudRest => AnswerClient::CloudRest(GroqBackend::new(
                settings,
                credentials.groq_api_key.as_deref(),
                transport,
            )?),
        };
        Ok(client)
    }

    /// Points the backend at a different endpoint (a full completions URL for
    /// the cloud backends, a base URL for local-http).
    pub fn with_endpoint(self, endpoint: impl Into<String>) -> Self {
        match self {
            AnswerClient::CloudChat(backend) => {
                AnswerClient::CloudChat(backend.with_endpoint(endpoint))
            }
            AnswerClient::LocalHttp(backend) => {
                AnswerClient::LocalHttp(backend.with_endpoint(endpoint))
            }
            AnswerClient::CloudRest(backend) => {
                AnswerClient::CloudRest(backend.with_endpoint(endpoint))
            }
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            AnswerClient::CloudChat(_) => ProviderKind::CloudChat,
            AnswerClient::LocalHttp(_) => ProviderKind::LocalHttp,
            AnswerClient::CloudRest(_) => ProviderKind::CloudRest,
        }
    }

    pub fn answer(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        match self {
            AnswerClient::CloudChat(backend) => backend.answer(prompt),
            AnswerClient::LocalHttp(backend) => backend.answer(prompt),
            AnswerClient::CloudRest(backend) => backend.answer(prompt),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use mockito::Matcher;
    use serde_json::json;

    use super::retry::testing::RecordingSleeper;
    use super::*;

    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
        requests: Mutex<Vec<(String, Option<String>, serde_json::Value)>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Result<HttpReply, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl HttpTransport for ScriptedTransport {
        fn post_json(
            &self,
            url: &str,
            bearer: Option<&str>,
            body: &serde_json::Value,
        ) -> Result<HttpReply, TransportError> {
            self.requests.lock().unwrap().push((
                url.to_string(),
                bearer.map(str::to_string),
                body.clone(),
            ));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Other("script exhausted".to_string())))
        }
    }

    fn ok(body: serde_json::Value) -> Result<HttpReply, TransportError> {
        Ok(HttpReply {
            status: 200,
            body: body.to_string(),
        })
    }

    fn prompt() -> Prompt {
        Prompt {
            system: "Avoid spoilers.".to_string(),
            user: "Who is that?".to_string(),
        }
    }

    fn settings(provider: ProviderKind) -> ProviderSettings {
        ProviderSettings {
            provider,
            model: "test-model".to_string(),
            temperature: ProviderSettings::default().temperature,
            max_output_tokens: 0,
            base_url: "http://ollama.local:11434/".to_string(),
            system_prompt: None,
        }
    }

    fn keys() -> Credentials {
        Credentials {
            openai_api_key: Some("sk-openai".to_string()),
            groq_api_key: Some("gsk-groq".to_string()),
        }
    }

    fn local_client(transport: Arc<ScriptedTransport>, sleeper: Arc<RecordingSleeper>) -> AnswerClient {
        AnswerClient::with_transport(
            &settings(ProviderKind::LocalHttp),
            &Credentials::default(),
            transport,
            sleeper,
        )
        .unwrap()
    }

    #[test]
    fn provider_names_parse() {
        assert_eq!("openai".parse::<ProviderKind>().unwrap(), ProviderKind::CloudChat);
        assert_eq!("Ollama".parse::<ProviderKind>().unwrap(), ProviderKind::LocalHttp);
        assert_eq!("cloud-rest".parse::<ProviderKind>().unwrap(), ProviderKind::CloudRest);
        assert!(matches!(
            "anthropic-ish".parse::<ProviderKind>(),
            Err(ProviderError::Configuration(_))
        ));
        assert!(ProviderSettings::for_provider("bogus").is_err());
    }

    #[test]
    fn missing_credentials_fail_at_construction() {
        let transport = ScriptedTransport::new(vec![]);
        for kind in [ProviderKind::CloudChat, ProviderKind::CloudRest] {
            let result = AnswerClient::with_transport(
                &settings(kind),
                &Credentials {
                    openai_api_key: Some("   ".to_string()),
                    groq_api_key: None,
                },
                transport.clone(),
                Arc::new(ThreadSleeper),
            );
            assert!(matches!(result, Err(ProviderError::Configuration(_))));
        }
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn local_http_sends_chat_body_and_trims_answer() {
        let transport = ScriptedTransport::new(vec![ok(json!({
            "message": {"role": "assistant", "content": "  It's Naomi.\n"}
        }))]);
        let mut with_limit = settings(ProviderKind::LocalHttp);
        with_limit.max_output_tokens = 200;
        let client = AnswerClient::with_transport(
            &with_limit,
            &Credentials::default(),
            transport.clone(),
            Arc::new(RecordingSleeper::default()),
        )
        .unwrap();

        assert_eq!(client.answer(&prompt()).unwrap(), "It's Naomi.");

        let requests = transport.requests.lock().unwrap();
        let (url, bearer, body) = &requests[0];
        assert_eq!(url, "http://ollama.local:11434/api/chat");
        assert!(bearer.is_none());
        assert_eq!(body["model"], "test-model");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["temperature"], 0.4);
        assert_eq!(body["options"]["num_predict"], 200);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Who is that?");
    }

    #[test]
    fn local_http_omits_unset_token_limit() {
        let transport = ScriptedTransport::new(vec![ok(json!({"message": {"content": "ok"}}))]);
        let client = local_client(transport.clone(), Arc::new(RecordingSleeper::default()));
        client.answer(&prompt()).unwrap();
        let requests = transport.requests.lock().unwrap();
        assert!(requests[0].2["options"].get("num_predict").is_none());
    }

    #[test]
    fn local_http_retries_timeouts_three_times() {
        let timeout = || Err(TransportError::Timeout("deadline elapsed".to_string()));
        let transport = ScriptedTransport::new(vec![timeout(), timeout(), timeout(), timeout()]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = local_client(transport.clone(), sleeper.clone());

        let err = client.answer(&prompt()).unwrap_err();

        assert!(matches!(err, ProviderError::Request { .. }));
        assert!(err.to_string().contains("after 3 attempts"));
        assert_eq!(transport.calls(), 3);
        let delays = sleeper.delays();
        assert_eq!(delays, vec![Duration::from_secs(2), Duration::from_secs(4)]);
        assert!(delays[1] > delays[0]);
    }

    #[test]
    fn local_http_recovers_after_timeout() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout("slow".to_string())),
            ok(json!({"message": {"content": "Second try"}})),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = local_client(transport.clone(), sleeper.clone());

        assert_eq!(client.answer(&prompt()).unwrap(), "Second try");
        assert_eq!(transport.calls(), 2);
        assert_eq!(sleeper.delays(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn local_http_non_timeout_error_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Other("connection refused".to_string())),
            ok(json!({"message": {"content": "never reached"}})),
        ]);
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = local_client(transport.clone(), sleeper.clone());

        let err = client.answer(&prompt()).unwrap_err();
        assert!(matches!(err, ProviderError::Request { .. }));
        assert!(err.to_string().contains("connection refused"));
        assert_eq!(transport.calls(), 1);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn local_http_error_status_is_a_request_error() {
        let transport = ScriptedTransport::new(vec![Ok(HttpReply {
            status: 404,
            body: r#"{"error":"model 'test-model' not found"}"#.to_string(),
        })]);
        let client = local_client(transport.clone(), Arc::new(RecordingSleeper::default()));

        match client.answer(&prompt()).unwrap_err() {
            ProviderError::Request { status, body, .. } => {
                assert_eq!(status, Some(404));
                assert_eq!(body.as_deref(), Some("model 'test-model' not found"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn local_http_empty_content_is_a_response_error() {
        for body in [json!({"message": {"content": "   "}}), json!({"done": true})] {
            let transport = ScriptedTransport::new(vec![ok(body)]);
            let client = local_client(transport, Arc::new(RecordingSleeper::default()));
            assert!(matches!(
                client.answer(&prompt()),
                Err(ProviderError::Response(_))
            ));
        }
    }

    #[test]
    fn cloud_backends_send_bearer_and_completion_body() {
        for (kind, url, key) in [
            (ProviderKind::CloudChat, OPENAI_CHAT_COMPLETIONS_URL, "sk-openai"),
            (ProviderKind::CloudRest, GROQ_CHAT_COMPLETIONS_URL, "gsk-groq"),
        ] {
            let transport = ScriptedTransport::new(vec![ok(json!({
                "choices": [{"message": {"role": "assistant", "content": "\nAnswer "}}]
            }))]);
            let mut with_limit = settings(kind);
            with_limit.max_output_tokens = 128;
            let client = AnswerClient::with_transport(
                &with_limit,
                &keys(),
                transport.clone(),
                Arc::new(ThreadSleeper),
            )
            .unwrap();
            assert_eq!(client.provider(), kind);

            assert_eq!(client.answer(&prompt()).unwrap(), "Answer");

            let requests = transport.requests.lock().unwrap();
            let (sent_url, bearer, body) = &requests[0];
            assert_eq!(sent_url, url);
            assert_eq!(bearer.as_deref(), Some(key));
            assert_eq!(body["stream"], false);
            assert_eq!(body["max_tokens"], 128);
            assert_eq!(body["temperature"], 0.4);
            assert_eq!(body["messages"].as_array().map(Vec::len), Some(2));
        }
    }

    #[test]
    fn cloud_rest_timeout_is_not_retried() {
        let transport = ScriptedTransport::new(vec![
            Err(TransportError::Timeout("slow".to_string())),
            ok(json!({"choices": [{"message": {"content": "late"}}]})),
        ]);
        let client = AnswerClient::with_transport(
            &settings(ProviderKind::CloudRest),
            &keys(),
            transport.clone(),
            Arc::new(ThreadSleeper),
        )
        .unwrap();

        assert!(matches!(
            client.answer(&prompt()),
            Err(ProviderError::Request { .. })
        ));
        assert_eq!(transport.calls(), 1);
    }

    #[test]
    fn cloud_rest_empty_choices_is_a_response_error() {
        let transport = ScriptedTransport::new(vec![ok(json!({"choices": []}))]);
        let client = AnswerClient::with_transport(
            &settings(ProviderKind::CloudRest),
            &keys(),
            transport,
            Arc::new(ThreadSleeper),
        )
        .unwrap();
        assert!(matches!(
            client.answer(&prompt()),
            Err(ProviderError::Response(_))
        ));
    }

    #[test]
    fn cloud_rest_over_the_wire_reports_status_and_body() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/openai/v1/chat/completions")
            .match_header("authorization", "Bearer gsk-groq")
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "stream": false
            })))
            .with_status(429)
            .with_body(r#"{"error":{"message":"rate limited"}}"#)
            .create();

        let client = AnswerClient::new(&settings(ProviderKind::CloudRest), &keys())
            .unwrap()
            .with_endpoint(format!("{}/openai/v1/chat/completions", server.url()));

        let err = client.answer(&prompt()).unwrap_err();
        mock.assert();
        match err {
            ProviderError::Request { status, body, .. } => {
                assert_eq!(status, Some(429));
                assert_eq!(body.as_deref(), Some("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn local_http_over_the_wire() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "stream": false,
                "options": {"temperature": 0.4}
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"message":{"role":"assistant","content":" Nothing spoiled. "}}"#)
            .create();

        let client = AnswerClient::new(&settings(ProviderKind::LocalHttp), &Credentials::default())
            .unwrap()
            .with_endpoint(server.url());

        assert_eq!(client.answer(&prompt()).unwrap(), "Nothing spoiled.");
        mock.assert();
    }

    #[test]
    fn default_temperature_is_sent_exactly() {
        let transport = ScriptedTransport::new(vec![
            ok(json!({"message": {"content": "ok"}})),
            ok(json!({"choices": [{"message": {"content": "ok"}}]})),
        ]);
        let local = local_client(transport.clone(), Arc::new(RecordingSleeper::default()));
        local.answer(&prompt()).unwrap();
        let cloud = AnswerClient::with_transport(
            &settings(ProviderKind::CloudChat),
            &keys(),
            transport.clone(),
            Arc::new(ThreadSleeper),
        )
        .unwrap();
        cloud.answer(&prompt()).unwrap();

        let requests = transport.requests.lock().unwrap();
        let local_body = requests[0].2.to_string();
        let cloud_body = requests[1].2.to_string();
        assert!(local_body.contains(r#""temperature":0.4"#), "{local_body}");
        assert!(!local_body.contains("0.40000"), "{local_body}");
        assert!(cloud_body.contains(r#""temperature":0.4"#), "{cloud_body}");
        assert!(!cloud_body.contains("0.40000"), "{cloud_body}");
    }

    #[test]
    fn credentials_debug_masks_keys() {
        let rendered = format!("{:?}", keys());
        assert!(!rendered.contains("sk-openai"));
        assert!(rendered.contains("<set>"));
    }
}
