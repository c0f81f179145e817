use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid timestamp {input:?}: {reason}")]
pub struct TimestampParseError {
    pub input: String,
    pub reason: String,
}

impl TimestampParseError {
    pub(crate) fn new(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SubtitleLoadError {
    #[error("subtitle file not found: {0}")]
    NotFound(String),

    #[error("failed to read subtitles from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse subtitles: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// Missing credential or unsupported provider, raised before any network call.
    #[error("provider configuration error: {0}")]
    Configuration(String),

    #[error("provider request failed: {message}")]
    Request {
        message: String,
        status: Option<u16>,
        body: Option<String>,
    },

    #[error("provider returned no usable content: {0}")]
    Response(String),
}

impl ProviderError {
    pub(crate) fn request(message: impl Into<String>) -> Self {
        ProviderError::Request {
            message: message.into(),
            status: None,
            body: None,
        }
    }

    pub(crate) fn status(provider: &str, status: u16, body: String) -> Self {
        ProviderError::Request {
            message: format!("{provider} returned HTTP {status}: {body}"),
            status: Some(status),
            body: Some(body),
        }
    }

    /// Whether a caller at the serving boundary may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Configuration(_))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("failed to write history file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode history: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum CompanionError {
    #[error(transparent)]
    Timestamp(#[from] TimestampParseError),

    #[error(transparent)]
    Subtitles(#[from] SubtitleLoadError),

    #[error(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    History(#[from] HistoryError),
}
