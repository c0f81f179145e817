use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::HistoryError;

/// Per-title viewing progress.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(default)]
    pub entries: Vec<String>,
    #[serde(default)]
    pub last_timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HistoryRecord {
    /// Raises `last_timestamp` (never lowers it) and appends unseen entries in order.
    pub fn merge(&mut self, timestamp_seconds: u64, watched: &[String]) {
        self.last_timestamp = self.last_timestamp.max(timestamp_seconds);
        for entry in watched {
            if !self.entries.contains(entry) {
                self.entries.push(entry.clone());
            }
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryDocument {
    #[serde(default)]
    titles: BTreeMap<String, HistoryRecord>,
}

/// JSON-file-backed watched history. Not internally synchronized: callers
/// must serialize writes for a given file.
#[derive(Debug)]
pub struct ViewingHistoryStore {
    path: PathBuf,
    document: HistoryDocument,
    recovered_from_corruption: bool,
}

impl ViewingHistoryStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (document, recovered_from_corruption) = load_document(&path);
        Self {
            path,
            document,
            recovered_from_corruption,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file existed but could not be decoded and was replaced
    /// with an empty history.
    pub fn recovered_from_corruption(&self) -> bool {
        self.recovered_from_corruption
    }

    pub fn get(&self, title: &str) -> HistoryRecord {
        self.document.titles.get(title).cloned().unwrap_or_default()
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.document.titles.keys().map(String::as_str)
    }

    pub fn record_viewing(
        &mut self,
        title: &str,
        timestamp_seconds: u64,
        previously_watched: Option<&[String]>,
    ) -> Result<HistoryRecord, HistoryError> {
        let record = self.document.titles.entry(title.to_string()).or_default();
        record.merge(timestamp_seconds, previously_watched.unwrap_or_default());
        let snapshot = record.clone();
        self.save()?;
        Ok(snapshot)
    }

    pub fn set_note(&mut self, title: &str, note: impl Into<String>) -> Result<(), HistoryError> {
        let record = self.document.titles.entry(title.to_string()).or_default();
        record.note = Some(note.into());
        self.save()
    }

    fn save(&self) -> Result<(), HistoryError> {
        let io_err = |source| HistoryError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let body = serde_json::to_string_pretty(&self.document)?;
        std::fs::write(&self.path, body).map_err(io_err)
    }
}

fn load_document(path: &Path) -> (HistoryDocument, bool) {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return (HistoryDocument::default(), false)
        }
        Err(err) => {
            tracing::warn!(
                "history file {} unreadable, starting empty: {}",
                path.display(),
                err
            );
            return (HistoryDocument::default(), true);
        }
    };

    match serde_json::from_str::<HistoryDocument>(&raw) {
        Ok(document) => (document, false),
        Err(err) => {
            tracing::warn!(
                "history file {} is corrupted, discarding it: {}",
                path.display(),
                err
            );
            (HistoryDocument::default(), true)
        }
    }
}
