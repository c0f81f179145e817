use std::path::Path;

use memchr::memchr_iter;
use serde::{Deserialize, Serialize};

use crate::error::SubtitleLoadError;

/// One subtitle entry at whole-second granularity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cue {
    pub start_seconds: u64,
    pub end_seconds: u64,
    pub text: String,
}

impl Cue {
    pub fn new(start_seconds: u64, end_seconds: u64, text: impl Into<String>) -> Self {
        Self {
            start_seconds,
            end_seconds: end_seconds.max(start_seconds),
            text: text.into(),
        }
    }
}

pub fn load_subtitles(path: impl AsRef<Path>) -> Result<Vec<Cue>, SubtitleLoadError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(SubtitleLoadError::NotFound(path.display().to_string()));
    }

    let bytes = std::fs::read(path).map_err(|source| SubtitleLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;

    let text = String::from_utf8_lossy(&bytes);
    let cues = parse_srt(&text)?;
    tracing::debug!("loaded {} cues from {}", cues.len(), path.display());
    Ok(cues)
}

/// Parses SRT text into cues sorted by end time.
///
/// The index line is optional. Text runs until a blank line or the next
/// header (an index line followed by a timing line, or a bare timing line).
pub fn parse_srt(input: &str) -> Result<Vec<Cue>, SubtitleLoadError> {
    let input = input.strip_prefix('\u{feff}').unwrap_or(input);
    let lines = split_lines(input);
    let mut cues = Vec::new();
    let mut pos = 0;

    while pos < lines.len() {
        if lines[pos].trim().is_empty() {
            pos += 1;
            continue;
        }

        let header = lines[pos].trim();
        let timing_line = if looks_like_index(header) {
            let next = lines.get(pos + 1).map(|l| l.trim()).unwrap_or_default();
            if !looks_like_timing(next) {
                return Err(SubtitleLoadError::Parse(format!(
                    "expected timing line after index {header}, found {next:?}"
                )));
            }
            pos += 2;
            next
        } else if looks_like_timing(header) {
            pos += 1;
            header
        } else {
            return Err(SubtitleLoadError::Parse(format!(
                "invalid header line: {header:?}"
            )));
        };

        let (start_ms, end_ms) = parse_timing_line(timing_line)?;

        let mut text_lines: Vec<&str> = Vec::new();
        while pos < lines.len() {
            let trimmed = lines[pos].trim();
            if trimmed.is_empty() {
                pos += 1;
                break;
            }
            if starts_next_entry(&lines, pos) {
                break;
            }
            text_lines.push(trimmed);
            pos += 1;
        }

        cues.push(Cue::new(start_ms / 1000, end_ms / 1000, text_lines.join("\n")));
    }

    cues.sort_by_key(|cue| cue.end_seconds);
    Ok(cues)
}

fn split_lines(input: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    for idx in memchr_iter(b'\n', input.as_bytes()) {
        lines.push(input[start..idx].trim_end_matches('\r'));
        start = idx + 1;
    }
    if start < input.len() {
        lines.push(input[start..].trim_end_matches('\r'));
    }
    lines
}

fn looks_like_index(line: &str) -> bool {
    !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit())
}

fn looks_like_timing(line: &str) -> bool {
    line.contains("-->")
}

fn starts_next_entry(lines: &[&str], pos: usize) -> bool {
    let line = lines[pos].trim();
    if looks_like_timing(line) {
        return true;
    }
    looks_like_index(line)
        && lines
            .get(pos + 1)
            .map(|next| looks_like_timing(next.trim()))
            .unwrap_or(false)
}

fn parse_timing_line(line: &str) -> Result<(u64, u64), SubtitleLoadError> {
    let (start, end) = line.split_once("-->").ok_or_else(|| {
        SubtitleLoadError::Parse(format!("invalid timing line: {line:?}"))
    })?;

    // Some files carry position hints after the end time ("X1:40 X2:600").
    let end = end.split_whitespace().next().unwrap_or_default();
    Ok((parse_srt_time(start.trim())?, parse_srt_time(end)?))
}

/// `HH:MM:SS,mmm` (or with a dot) to milliseconds.
fn parse_srt_time(value: &str) -> Result<u64, SubtitleLoadError> {
    let invalid = || SubtitleLoadError::Parse(format!("invalid SRT timestamp: {value:?}"));

    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let hours = parse_digits(parts[0], 4).ok_or_else(invalid)?;
    let minutes = parse_digits(parts[1], 2).ok_or_else(invalid)?;

    let (secs, frac) = match parts[2].split_once([',', '.']) {
        Some((secs, frac)) => (secs, frac),
        None => (parts[2], ""),
    };
    let secs = parse_digits(secs, 2).ok_or_else(invalid)?;
    let millis = if frac.is_empty() {
        0
    } else {
        let padded: String = frac.chars().chain("000".chars()).take(3).collect();
        parse_digits(&padded, 3).ok_or_else(invalid)?
    };

    hours
        .checked_mul(60)
        .and_then(|total| total.checked_add(minutes))
        .and_then(|total| total.checked_mul(60))
        .and_then(|total| total.checked_add(secs))
        .and_then(|total| total.checked_mul(1000))
        .and_then(|total| total.checked_add(millis))
        .ok_or_else(invalid)
}

fn parse_digits(value: &str, max_digits: usize) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || value.len() > max_digits || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}
