use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Upper bound on a trimmed chat message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One prior turn of the conversation, supplied by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub role: ChatRole,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(custom(function = "validate_message_content"))]
    pub message: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_include_context")]
    pub include_calendar_context: bool,
    #[serde(default)]
    pub conversation_history: Option<Vec<ChatMessage>>,
}

fn default_include_context() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub timestamp: DateTime<Utc>,
    pub calendar_context_included: bool,
    pub event_count: usize,
}

/// Whether `message` is non-blank and within [`MAX_MESSAGE_CHARS`] once trimmed.
pub fn is_valid_message(message: &str) -> bool {
    let trimmed = message.trim();
    !trimmed.is_empty() && trimmed.chars().count() <= MAX_MESSAGE_CHARS
}

fn validate_message_content(message: &str) -> Result<(), ValidationError> {
    if is_valid_message(message) {
        Ok(())
    } else {
        let mut err = ValidationError::new("message");
        err.message = Some("Message cannot be empty or too long".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_validation() {
        assert!(is_valid_message("What's on today?"));
        assert!(!is_valid_message(""));
        assert!(!is_valid_message("   \n\t"));
        assert!(is_valid_message(&"a".repeat(MAX_MESSAGE_CHARS)));
        assert!(!is_valid_message(&"a".repeat(MAX_MESSAGE_CHARS + 1)));
    }

    #[test]
    fn test_length_limit_applies_after_trim() {
        let padded = format!("  {}  ", "a".repeat(MAX_MESSAGE_CHARS));
        assert!(is_valid_message(&padded));
    }

    #[test]
    fn test_request_defaults() {
        let request: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert!(request.include_calendar_context);
        assert!(request.conversation_history.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_blank_request_fails_validation() {
        let request: ChatRequest =
            serde_json::from_str(r#"{"message":"  ","timestamp":"2024-05-01T09:00:00Z"}"#)
                .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_history_roles_deserialize() {
        let message: ChatMessage = serde_json::from_str(
            r#"{"id":"m1","content":"hello","role":"assistant","timestamp":"2024-05-01T09:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(message.role, ChatRole::Assistant);
    }
}
