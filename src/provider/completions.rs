//! Shared wire shape for OpenAI-compatible chat completion endpoints.

use serde::{Deserialize, Serialize};

use super::transport::{normalize_err_body, HttpReply, HttpTransport};
use crate::error::ProviderError;
use crate::prompt::{ChatMessage, Prompt};

#[derive(Serialize)]
struct CompletionReq<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResp {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

pub(crate) struct CompletionCall<'a> {
    pub provider: &'static str,
    pub endpoint: &'a str,
    pub api_key: &'a str,
    pub model: &'a str,
    pub temperature: f64,
    pub max_output_tokens: u32,
}

impl CompletionCall<'_> {
    pub fn send(
        &self,
        transport: &dyn HttpTransport,
        prompt: &Prompt,
    ) -> Result<String, ProviderError> {
        let body = serde_json::to_value(CompletionReq {
            model: self.model,
            messages: prompt.messages(),
            temperature: self.temperature,
            stream: false,
            max_tokens: (self.max_output_tokens > 0).then_some(self.max_output_tokens),
        })
        .map_err(|err| ProviderError::request(format!("failed to encode request: {err}")))?;

        tracing::info!("sending completion request to {} model={}", self.provider, self.model);

        let reply = transport
            .post_json(self.endpoint, Some(self.api_key), &body)
            .map_err(|err| {
                ProviderError::request(format!("{} request failed: {err}", self.provider))
            })?;

        self.read_reply(reply)
    }

    fn read_reply(&self, reply: HttpReply) -> Result<String, ProviderError> {
        if !reply.is_success() {
            return Err(ProviderError::status(
                self.provider,
                reply.status,
                normalize_err_body(&reply.body),
            ));
        }

        let decoded: CompletionResp = serde_json::from_str(&reply.body).map_err(|err| {
            ProviderError::Response(format!("failed to decode {} response: {err}", self.provider))
        })?;

        let content = decoded
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(ProviderError::Response(format!(
                "{} returned an empty response",
                self.provider
            )));
        }
        Ok(content)
    }
}
