use serde::{Deserialize, Serialize};

use crate::error::PromptError;
use crate::history::HistoryRecord;
use crate::timestamp::format_clock;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly movie or TV companion assistant. \
Answer questions using only the provided context, watched history, and logical inference \
based solely on events up to the specified timestamp. \
Never mention or hint at spoilers, twists, or future events beyond the timestamp. \
If the viewer requests major spoilers, gently refuse. \
When the context is sparse, acknowledge uncertainty and suggest rechecking or continuing to watch. \
Keep responses concise, helpful, and conversational.";

const NO_CONTEXT_MARKER: &str = "No subtitle context available before this timestamp.";
const NO_HISTORY_MARKER: &str = "None noted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Everything needed to phrase one viewer question. Built per query.
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub title: String,
    pub timestamp_seconds: u64,
    pub question: String,
    pub context_text: String,
    pub history_record: HistoryRecord,
    pub previously_watched: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(self.system.clone()),
            ChatMessage::user(self.user.clone()),
        ]
    }
}

pub fn build_prompt(
    request: &AnswerRequest,
    system_prompt: Option<&str>,
) -> Result<Prompt, PromptError> {
    if request.title.trim().is_empty() {
        return Err(PromptError::MissingField("title"));
    }
    if request.question.trim().is_empty() {
        return Err(PromptError::MissingField("question"));
    }

    let watched: &[String] = match &request.previously_watched {
        Some(list) if !list.is_empty() => list,
        _ => &request.history_record.entries,
    };
    let watched_text = if watched.is_empty() {
        NO_HISTORY_MARKER.to_string()
    } else {
        watched.join(", ")
    };

    let context_block = if request.context_text.is_empty() {
        NO_CONTEXT_MARKER
    } else {
        request.context_text.as_str()
    };

    let user = format!(
        "Title: {title}\n\
         Current timestamp (HH:MM:SS): {timestamp}\n\
         Previously watched episodes/movies: {watched_text}\n\
         Last recorded timestamp in history: {last_seen} seconds\n\n\
         Context up to this timestamp:\n{context_block}\n\n\
         Viewer question: {question}",
        title = request.title,
        timestamp = format_clock(request.timestamp_seconds),
        last_seen = request.history_record.last_timestamp,
        question = request.question,
    );

    Ok(Prompt {
        system: system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT).to_string(),
        user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> AnswerRequest {
        AnswerRequest {
            title: "The Expanse".to_string(),
            timestamp_seconds: 3723,
            question: "Who is on the bridge?".to_string(),
            context_text: "Holden: Get us out of here.".to_string(),
            history_record: HistoryRecord {
                entries: vec!["S01E01".to_string(), "S01E02".to_string()],
                last_timestamp: 1200,
                note: None,
            },
            previously_watched: None,
        }
    }

    #[test]
    fn user_message_follows_fixed_order() {
        let prompt = build_prompt(&request(), None).unwrap();
        let expected = "Title: The Expanse\n\
                        Current timestamp (HH:MM:SS): 01:02:03\n\
                        Previously watched episodes/movies: S01E01, S01E02\n\
                        Last recorded timestamp in history: 1200 seconds\n\n\
                        Context up to this timestamp:\nHolden: Get us out of here.\n\n\
                        Viewer question: Who is on the bridge?";
        assert_eq!(prompt.user, expected);
        assert_eq!(prompt.system, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn explicit_watched_list_overrides_history() {
        let mut req = request();
        req.previously_watched = Some(vec!["Pilot".to_string()]);
        let prompt = build_prompt(&req, None).unwrap();
        assert!(prompt.user.contains("Previously watched episodes/movies: Pilot\n"));
    }

    #[test]
    fn empty_history_and_context_use_markers() {
        let mut req = request();
        req.history_record = HistoryRecord::default();
        req.context_text.clear();
        let prompt = build_prompt(&req, None).unwrap();
        assert!(prompt.user.contains("Previously watched episodes/movies: None noted"));
        assert!(prompt.user.contains("Last recorded timestamp in history: 0 seconds"));
        assert!(prompt.user.contains(NO_CONTEXT_MARKER));
    }

    #[test]
    fn system_prompt_is_overridable() {
        let prompt = build_prompt(&request(), Some("Be terse.")).unwrap();
        let messages = prompt.messages();
        assert_eq!(messages[0], ChatMessage::system("Be terse."));
        assert_eq!(messages[1].role, "user");
    }

    #[test]
    fn missing_fields_fail() {
        let mut req = request();
        req.question = "  ".to_string();
        assert_eq!(
            build_prompt(&req, None),
            Err(PromptError::MissingField("question"))
        );
        req.title.clear();
        assert_eq!(build_prompt(&req, None), Err(PromptError::MissingField("title")));
    }
}
