//! Relay event vocabulary
//!
//! The events the coordinator emits towards a session's channel, with the
//! exact payload shapes clients receive.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use relay_core::ChatMessage;

pub const CHAT_TYPING: &str = "chat:typing";
pub const CHAT_THINKING: &str = "chat:thinking";
pub const CHAT_TOOL: &str = "chat:tool";
pub const CHAT_RESPONSE: &str = "chat:response";
pub const CHAT_MESSAGE: &str = "chat:message";
pub const CHAT_HISTORY: &str = "chat:history";
pub const CHAT_ERROR: &str = "chat:error";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    pub is_typing: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingPayload {
    pub chat_id: String,
    pub thought: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Running,
    Completed,
    Error,
}

/// Progress of one tool call. The running and terminal events of a call share
/// `id`; clients update the entry in place.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolExecutionEvent {
    pub id: String,
    /// Id of the user message that triggered the run
    pub chat_id: String,
    pub tool: String,
    pub input: Value,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    Typing(TypingPayload),
    Thinking(ThinkingPayload),
    Tool(ToolExecutionEvent),
    Response(ChatMessage),
}

impl RelayEvent {
    pub fn typing(is_typing: bool) -> Self {
        Self::Typing(TypingPayload {
            is_typing,
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    pub fn thinking(chat_id: impl Into<String>, thought: impl Into<String>) -> Self {
        Self::Thinking(ThinkingPayload {
            chat_id: chat_id.into(),
            thought: thought.into(),
            timestamp: Utc::now().timestamp_millis(),
        })
    }

    /// Wire event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Typing(_) => CHAT_TYPING,
            Self::Thinking(_) => CHAT_THINKING,
            Self::Tool(_) => CHAT_TOOL,
            Self::Response(_) => CHAT_RESPONSE,
        }
    }

    /// Wire payload
    pub fn payload(&self) -> serde_json::Result<Value> {
        match self {
            Self::Typing(payload) => serde_json::to_value(payload),
            Self::Thinking(payload) => serde_json::to_value(payload),
            Self::Tool(event) => serde_json::to_value(event),
            Self::Response(message) => serde_json::to_value(message),
        }
    }
}

/// Answer to `chat:history`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPayload {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
}

/// Answer to a rejected `chat:message`
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Cut `text` to at most `cap` characters
pub fn truncate_output(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
