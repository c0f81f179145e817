use std::collections::VecDeque;

use crate::error::SubtitleLoadError;
use crate::subtitles::{parse_srt, Cue};

pub const DEFAULT_CONTEXT_WINDOW_SECONDS: u64 = 5 * 60;
pub const DEFAULT_CONTEXT_MAX_CHARACTERS: usize = 4_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContextOptions {
    /// How far back from the timestamp cues are kept. `None` or zero keeps everything.
    pub window_seconds: Option<u64>,
    /// Character budget for the joined context. `None` or zero disables eviction.
    pub max_characters: Option<usize>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            window_seconds: Some(DEFAULT_CONTEXT_WINDOW_SECONDS),
            max_characters: Some(DEFAULT_CONTEXT_MAX_CHARACTERS),
        }
    }
}

impl ContextOptions {
    pub fn unbounded() -> Self {
        Self {
            window_seconds: None,
            max_characters: None,
        }
    }

    fn start_seconds(&self, timestamp_seconds: u64) -> u64 {
        match self.window_seconds {
            Some(window) if window > 0 => timestamp_seconds.saturating_sub(window),
            _ => 0,
        }
    }
}

/// FIFO of normalized cue lines bounded by a character budget.
///
/// The joined length counts one separator between adjacent lines; when the
/// budget is exceeded the oldest lines go first.
#[derive(Debug, Default)]
pub struct ContextWindow {
    lines: VecDeque<String>,
    text_chars: usize,
    budget: Option<usize>,
}

impl ContextWindow {
    pub fn new(budget: Option<usize>) -> Self {
        Self {
            lines: VecDeque::new(),
            text_chars: 0,
            budget: budget.filter(|b| *b > 0),
        }
    }

    pub fn push(&mut self, line: String) {
        self.text_chars += line.chars().count();
        self.lines.push_back(line);

        let Some(budget) = self.budget else {
            return;
        };
        while !self.lines.is_empty() && self.joined_len() > budget {
            if let Some(evicted) = self.lines.pop_front() {
                self.text_chars -= evicted.chars().count();
            }
        }
    }

    pub fn joined_len(&self) -> usize {
        self.text_chars + self.lines.len().saturating_sub(1)
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_text(self) -> String {
        Vec::from(self.lines).join("\n").trim().to_string()
    }
}

/// Subtitle text spoken at or before `timestamp_seconds`, limited by `options`.
///
/// Cues must be ordered by end time; iteration stops at the first cue that
/// ends after the timestamp.
pub fn extract_context(cues: &[Cue], timestamp_seconds: u64, options: ContextOptions) -> String {
    let start = options.start_seconds(timestamp_seconds);
    let mut window = ContextWindow::new(options.max_characters);

    for cue in cues {
        if cue.end_seconds > timestamp_seconds {
            break;
        }
        if cue.end_seconds < start {
            continue;
        }

        let normalized = normalize_text(&cue.text);
        if normalized.is_empty() {
            continue;
        }
        window.push(normalized);
    }

    window.into_text()
}

/// Everything up to the timestamp with no time or size bound.
pub fn context_until_timestamp(cues: &[Cue], timestamp_seconds: u64) -> String {
    extract_context(cues, timestamp_seconds, ContextOptions::unbounded())
}

pub fn extract_context_from_text(
    subtitles_text: &str,
    timestamp_seconds: u64,
    options: ContextOptions,
) -> Result<String, SubtitleLoadError> {
    let cues = parse_srt(subtitles_text)?;
    Ok(extract_context(&cues, timestamp_seconds, options))
}

fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
