use std::env;
use std::path::PathBuf;

use crate::context::{ContextOptions, DEFAULT_CONTEXT_MAX_CHARACTERS, DEFAULT_CONTEXT_WINDOW_SECONDS};
use crate::error::ProviderError;
use crate::provider::{Credentials, ProviderKind, ProviderSettings};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub history_path: PathBuf,
    pub public_dir: PathBuf,
    pub generation_concurrency: usize,
    pub provider: ProviderSettings,
    pub context: ContextOptions,
    pub credentials: Credentials,
}

impl AppConfig {
    /// Reads configuration from the environment. An unknown
    /// `COMPANION_PROVIDER` is rejected here, before any client exists.
    pub fn from_env() -> Result<Self, ProviderError> {
        let defaults = ProviderSettings::default();

        let provider = match env::var("COMPANION_PROVIDER") {
            Ok(name) if !name.trim().is_empty() => name.parse::<ProviderKind>()?,
            _ => defaults.provider,
        };

        let bind_addr = match env::var("PORT").ok().and_then(|v| v.parse::<u16>().ok()) {
            Some(port) => format!("0.0.0.0:{port}"),
            None => env::var("COMPANION_BIND").unwrap_or_else(|_| "127.0.0.1:8000".to_string()),
        };

        Ok(Self {
            bind_addr,
            history_path: env::var("COMPANION_HISTORY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/watched_history.json")),
            public_dir: env::var("COMPANION_PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public")),
            generation_concurrency: parse_var::<usize>("GENERATION_CONCURRENCY").unwrap_or(2).max(1),
            provider: ProviderSettings {
                provider,
                model: env::var("COMPANION_MODEL").unwrap_or(defaults.model),
                temperature: parse_var("COMPANION_TEMPERATURE").unwrap_or(defaults.temperature),
                max_output_tokens: parse_var("COMPANION_MAX_OUTPUT_TOKENS")
                    .unwrap_or(defaults.max_output_tokens),
                base_url: env::var("OLLAMA_BASE_URL").unwrap_or(defaults.base_url),
                system_prompt: env::var("SYSTEM_PROMPT")
                    .ok()
                    .filter(|v| !v.trim().is_empty()),
            },
            context: ContextOptions {
                window_seconds: Some(
                    parse_var("CONTEXT_WINDOW_SECONDS").unwrap_or(DEFAULT_CONTEXT_WINDOW_SECONDS),
                ),
                max_characters: Some(
                    parse_var("CONTEXT_MAX_CHARACTERS").unwrap_or(DEFAULT_CONTEXT_MAX_CHARACTERS),
                ),
            },
            credentials: credentials_from_env(None, None),
        })
    }
}

/// Explicit keys win; otherwise `OPENAI_API_KEY` / `GROQ_API_KEY`.
pub fn credentials_from_env(openai: Option<String>, groq: Option<String>) -> Credentials {
    Credentials {
        openai_api_key: resolve_secret(openai, "OPENAI_API_KEY"),
        groq_api_key: resolve_secret(groq, "GROQ_API_KEY"),
    }
}

fn resolve_secret(explicit: Option<String>, var: &str) -> Option<String> {
    explicit
        .filter(|v| !v.trim().is_empty())
        .or_else(|| env::var(var).ok().filter(|v| !v.trim().is_empty()))
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
