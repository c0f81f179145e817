use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::AppConfig;
use crate::context::{extract_context, ContextOptions};
use crate::error::CompanionError;
use crate::history::{HistoryRecord, ViewingHistoryStore};
use crate::prompt::{build_prompt, AnswerRequest};
use crate::provider::{AnswerClient, Credentials, ProviderSettings};
use crate::subtitles::load_subtitles;
use crate::timestamp::{parse_timestamp, TimestampValue};

#[derive(Clone, Debug)]
pub struct CompanionConfig {
    pub history_path: PathBuf,
    pub provider: ProviderSettings,
    pub context: ContextOptions,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from("data/watched_history.json"),
            provider: ProviderSettings::default(),
            context: ContextOptions::default(),
        }
    }
}

impl From<&AppConfig> for CompanionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            history_path: config.history_path.clone(),
            provider: config.provider.clone(),
            context: config.context,
        }
    }
}

/// Shared handle to the history file. Writes go through the mutex, which is
/// never held across a provider call.
pub type SharedHistory = Arc<Mutex<ViewingHistoryStore>>;

pub fn open_shared_history(path: impl Into<PathBuf>) -> SharedHistory {
    Arc::new(Mutex::new(ViewingHistoryStore::open(path)))
}

/// Ties timestamp parsing, subtitle windowing, history and the provider
/// client into one question/answer call.
pub struct MovieCompanion {
    config: CompanionConfig,
    client: AnswerClient,
    history: SharedHistory,
}

impl MovieCompanion {
    pub fn new(config: CompanionConfig, credentials: &Credentials) -> Result<Self, CompanionError> {
        let client = AnswerClient::new(&config.provider, credentials)?;
        let history = open_shared_history(config.history_path.clone());
        Ok(Self::from_parts(config, client, history))
    }

    pub fn from_parts(config: CompanionConfig, client: AnswerClient, history: SharedHistory) -> Self {
        Self {
            config,
            client,
            history,
        }
    }

    pub fn history_for(&self, title: &str) -> HistoryRecord {
        self.lock_history().get(title)
    }

    pub fn answer_question(
        &self,
        title: &str,
        subtitle_path: &Path,
        timestamp: impl Into<TimestampValue>,
        question: &str,
        previously_watched: Option<&[String]>,
    ) -> Result<String, CompanionError> {
        let seconds = parse_timestamp(timestamp)?;
        let cues = load_subtitles(subtitle_path)?;
        let context = extract_context(&cues, seconds, self.config.context);
        self.answer_from_context(title, &context, seconds, question, previously_watched)
    }

    /// Answers with caller-supplied context, then records progress for the title.
    pub fn answer_from_context(
        &self,
        title: &str,
        context: &str,
        timestamp_seconds: u64,
        question: &str,
        previously_watched: Option<&[String]>,
    ) -> Result<String, CompanionError> {
        let request = AnswerRequest {
            title: title.to_string(),
            timestamp_seconds,
            question: question.to_string(),
            context_text: context.to_string(),
            history_record: self.history_for(title),
            previously_watched: previously_watched.map(<[String]>::to_vec),
        };
        let prompt = build_prompt(&request, self.config.provider.system_prompt.as_deref())?;

        tracing::info!(
            "answering question for {:?} at {}s via {}",
            title,
            timestamp_seconds,
            self.client.provider()
        );
        let answer = self.client.answer(&prompt)?;

        self.lock_history()
            .record_viewing(title, timestamp_seconds, previously_watched)?;
        Ok(answer)
    }

    fn lock_history(&self) -> MutexGuard<'_, ViewingHistoryStore> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
