use std::fmt;

use regex::Regex;
use serde::Deserialize;

use crate::error::TimestampParseError;

/// A playback position as supplied by a caller: whole seconds, fractional
/// seconds, or text (`"95"`, `"1:02:03"`, `"01:02:03"`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimestampValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for TimestampValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampValue::Integer(v) => write!(f, "{v}"),
            TimestampValue::Float(v) => write!(f, "{v}"),
            TimestampValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for TimestampValue {
    fn from(value: i64) -> Self {
        TimestampValue::Integer(value)
    }
}

impl From<u64> for TimestampValue {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(TimestampValue::Integer)
            .unwrap_or(TimestampValue::Float(value as f64))
    }
}

impl From<f64> for TimestampValue {
    fn from(value: f64) -> Self {
        TimestampValue::Float(value)
    }
}

impl From<&str> for TimestampValue {
    fn from(value: &str) -> Self {
        TimestampValue::Text(value.to_string())
    }
}

impl From<String> for TimestampValue {
    fn from(value: String) -> Self {
        TimestampValue::Text(value)
    }
}

pub fn parse_timestamp(value: impl Into<TimestampValue>) -> Result<u64, TimestampParseError> {
    match value.into() {
        TimestampValue::Integer(seconds) => u64::try_from(seconds)
            .map_err(|_| TimestampParseError::new(seconds.to_string(), "cannot be negative")),
        TimestampValue::Float(seconds) => {
            if !seconds.is_finite() {
                return Err(TimestampParseError::new(
                    seconds.to_string(),
                    "must be a finite number",
                ));
            }
            if seconds < 0.0 {
                return Err(TimestampParseError::new(
                    seconds.to_string(),
                    "cannot be negative",
                ));
            }
            Ok(seconds.trunc() as u64)
        }
        TimestampValue::Text(text) => parse_text(&text),
    }
}

fn parse_text(raw: &str) -> Result<u64, TimestampParseError> {
    let token = raw.trim();
    if token.is_empty() {
        return Err(TimestampParseError::new(raw, "timestamp string is empty"));
    }

    if token.bytes().all(|b| b.is_ascii_digit()) {
        return token
            .parse::<u64>()
            .map_err(|_| TimestampParseError::new(raw, "seconds value out of range"));
    }

    let clock = Regex::new(r"^(\d{1,2}):([0-5]\d):([0-5]\d)$")
        .map_err(|err| TimestampParseError::new(raw, err.to_string()))?;
    let captures = clock
        .captures(token)
        .ok_or_else(|| TimestampParseError::new(raw, "unsupported timestamp format"))?;

    let field = |idx: usize| -> u64 {
        captures
            .get(idx)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };

    Ok(field(1) * 3600 + field(2) * 60 + field(3))
}

/// Renders seconds as zero-padded `HH:MM:SS`.
pub fn format_seconds(seconds: i64) -> Result<String, TimestampParseError> {
    if seconds < 0 {
        return Err(TimestampParseError::new(
            seconds.to_string(),
            "seconds cannot be negative",
        ));
    }
    Ok(format_clock(seconds.unsigned_abs()))
}

/// Infallible variant for values already known to be non-negative.
pub fn format_clock(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}
