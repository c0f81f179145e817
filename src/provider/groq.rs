use std::sync::Arc;

use super::completions::CompletionCall;
use super::transport::HttpTransport;
use super::ProviderSettings;
use crate::error::ProviderError;
use crate::prompt::Prompt;

pub const GROQ_CHAT_COMPLETIONS_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Cloud REST completion service reached with a bearer key.
#[derive(Clone)]
pub struct GroqBackend {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_output_tokens: u32,
}

impl GroqBackend {
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
                    "GROQ_API_KEY is required when using the cloud-rest provider".to_string(),
                )
            })?;

        Ok(Self {
            transport,
            endpoint: GROQ_CHAT_COMPLETIONS_URL.to_string(),
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
            provider: "groq",
            endpoint: &self.endpoint,
            api_key: &self.api_key,
            model: &self.model,
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
        .send(self.transport.as_ref(), prompt)
    }
}
