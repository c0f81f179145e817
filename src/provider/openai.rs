use std::sync::Arc;

use super::completions::CompletionCall;
use super::transport::HttpTransport;
use super::ProviderSettings;
use crate::error::ProviderError;
use crate::prompt::Prompt;

pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Managed chat-completion service. No retries here: one call, one outcome.
#[derive(Clone)]
pub struct OpenAiBackend {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl OpenAiBackend {
    pub fn new(
        settings: &ProviderSettings,
        api_key: Option<&str>,
        transport: Arc<dyn HttpTransport>,
    ) -> Result<Self, ProviderError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                ProviderError::Configuration(
                    "OPENAI_API_KEY is required when using the cloud-chat provider".to_string(),
                )
            })?;

        Ok(Self {
            transport,
            endpoint: OPENAI_CHAT_COMPLETIONS_URL.to_string(),
            api_key: api_key.to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn answer(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        CompletionCall {
            provider: "openai",
            endpoint: &self.endpoint,
            api_key: &self.api_key,
            model: &self.model,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
        .send(self.transport.as_ref(), prompt)
    }
}
