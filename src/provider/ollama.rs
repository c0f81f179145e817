use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::retry::{run_with_retry, RetryPolicy, Sleeper};
use super::transport::{normalize_err_body, HttpReply, HttpTransport, TransportError};
use super::ProviderSettings;
use crate::error::ProviderError;
use crate::prompt::{ChatMessage, Prompt};

/// Self-hosted Ollama server reached over `/api/chat`. Timeouts are retried
/// with exponential backoff; every other failure is returned at once.
#[derive(Clone)]
pub struct OllamaBackend {
    transport: Arc<dyn HttpTransport>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
    base_url: String,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl OllamaBackend {
    pub fn new(
        settings: &ProviderSettings,
        transport: Arc<dyn HttpTransport>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            retry: RetryPolicy::timeouts_only(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        }
    }

    pub fn with_endpoint(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn answer(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        #[derive(Serialize)]
        struct ChatReq<'a> {
            model: &'a str,
            messages: Vec<ChatMessage>,
            stream: bool,
            options: ChatOptions,
        }

        #[derive(Serialize)]
        struct ChatOptions {
            temperature: f64,
            #[serde(skip_serializing_if = "Option::is_none")]
            num_predict: Option<u32>,
        }

        let body = serde_json::to_value(ChatReq {
            model: &self.model,
            messages: prompt.messages(),
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
                num_predict: (self.max_output_tokens > 0).then_some(self.max_output_tokens),
            },
        })
        .map_err(|err| ProviderError::request(format!("failed to encode ollama request: {err}")))?;

        let url = format!("{}/api/chat", self.base_url);
        tracing::info!("sending chat request to ollama at {} model={}", url, self.model);

        let reply: HttpReply = run_with_retry(&self.retry, self.sleeper.as_ref(), |_| {
            self.transport.post_json(&url, None, &body)
        })
        .map_err(|err| {
            let message = match &err.last_error {
                TransportError::Timeout(_) => format!(
                    "ollama request failed after {} attempts: {}",
                    err.attempts, err.last_error
                ),
                TransportError::Other(_) => format!("ollama request failed: {}", err.last_error),
            };
            ProviderError::request(message)
        })?;

        read_chat_reply(reply)
    }
}

fn read_chat_reply(reply: HttpReply) -> Result<String, ProviderError> {
    #[derive(Deserialize)]
    struct ChatResp {
        message: Option<ChatRespMessage>,
    }

    #[derive(Deserialize)]
    struct ChatRespMessage {
        content: Option<String>,
    }

    if !reply.is_success() {
        return Err(ProviderError::status(
            "ollama",
            reply.status,
            normalize_err_body(&reply.body),
        ));
    }

    let response = serde_json::from_str::<ChatResp>(&reply.body).map_err(|err| {
        ProviderError::Response(format!("failed to decode ollama /api/chat response: {err}"))
    })?;

    let content = response
        .message
        .and_then(|message| message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default();

    if content.is_empty() {
        return Err(ProviderError::Response(
            "ollama returned an empty response".to_string(),
        ));
    }
    Ok(content)
}
