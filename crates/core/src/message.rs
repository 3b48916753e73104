//! Chat messages exchanged between a client and the assistant

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Message role in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    /// Uppercase label used when rendering transcripts
    pub fn label(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Assistant => "ASSISTANT",
        }
    }
}

/// A single conversation turn. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: String,

    /// Role of the message sender
    pub role: MessageRole,

    /// Message content
    pub content: String,

    /// Timestamp in milliseconds
    pub timestamp: i64,
}

impl ChatMessage {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), MessageRole::User, content)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), MessageRole::Assistant, content)
    }

    /// Create with a specific ID
    pub fn with_id(id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// Raw `chat:message` payload as sent by a client.
///
/// Every field is optional on the wire so that a malformed payload still
/// reaches [`InboundMessage::validate`] instead of being dropped by the decoder.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl InboundMessage {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            role: Some("user".to_string()),
            content: content.into(),
            timestamp: None,
        }
    }

    /// Check the payload and turn it into a user [`ChatMessage`].
    pub fn validate(self, session_id: &str) -> Result<ChatMessage, ValidationError> {
        if session_id.trim().is_empty() {
            return Err(ValidationError::MissingSessionId);
        }
        if self.content.trim().is_empty() {
            return Err(ValidationError::EmptyContent);
        }
        if let Some(role) = self.role.as_deref() {
            if !role.eq_ignore_ascii_case("user") {
                return Err(ValidationError::UnexpectedRole(role.to_string()));
            }
        }

        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(ChatMessage {
            id,
            role: MessageRole::User,
            content: self.content,
            timestamp: self
                .timestamp
                .unwrap_or_else(|| Utc::now().timestamp_millis()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let user = ChatMessage::user("hello");
        let assistant = ChatMessage::assistant("hi there");

        assert_eq!(user.role, MessageRole::User);
        assert_eq!(assistant.role, MessageRole::Assistant);
        assert_ne!(user.id, assistant.id);
        assert!(user.timestamp > 0);
    }

    #[test]
    fn test_message_serializes_lowercase_role() {
        let message = ChatMessage::with_id("m1", MessageRole::Assistant, "ok");
        let json = serde_json::to_value(&message).unwrap();

        assert_eq!(json["role"], "assistant");
        assert_eq!(json["id"], "m1");
    }

    #[test]
    fn test_validate_keeps_client_id() {
        let message = InboundMessage::new("m1", "what's the weather?")
            .validate("s1")
            .unwrap();

        assert_eq!(message.id, "m1");
        assert_eq!(message.role, MessageRole::User);
        assert_eq!(message.content, "what's the weather?");
    }

    #[test]
    fn test_validate_generates_missing_id() {
        let inbound: InboundMessage = serde_json::from_str(r#"{"content":"hi"}"#).unwrap();
        let message = inbound.validate("s1").unwrap();

        assert!(!message.id.is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_payloads() {
        assert_eq!(
            InboundMessage::new("m1", "   ").validate("s1"),
            Err(ValidationError::EmptyContent)
        );
        assert_eq!(
            InboundMessage::new("m1", "hi").validate(""),
            Err(ValidationError::MissingSessionId)
        );

        let mut inbound = InboundMessage::new("m1", "hi");
        inbound.role = Some("assistant".to_string());
        assert_eq!(
            inbound.validate("s1"),
            Err(ValidationError::UnexpectedRole("assistant".to_string()))
        );
    }
}
