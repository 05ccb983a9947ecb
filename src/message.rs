//! Message protocol definitions
//!
//! Wire JSON for room traffic, both directions:
//!
//! ```json
//! { "type": "CHAT", "sender": "alice", "content": "hi", "timestamp": "..." }
//! ```
//!
//! Outbound [`ChatMessage`]s always carry a server-assigned RFC 3339
//! timestamp; whatever timestamp a client sends is parsed into
//! [`InboundEvent`] and discarded. This module is the validation/shaping
//! half of message routing; the transport half lives in `handler`.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::AppError;

/// Longest accepted chat message body.
const MAX_CONTENT_LEN: usize = 2000;
/// Longest accepted display name.
const MAX_SENDER_LEN: usize = 64;

/// Kind of room event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Join,
    Leave,
    Chat,
}

/// A single broadcast event. Never mutated after it is handed to the hub.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub sender: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ChatMessage {
    /// A user's chat line, stamped with the server clock.
    pub fn chat(sender: &str, content: String) -> Self {
        Self {
            kind: MessageType::Chat,
            sender: sender.to_string(),
            content,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// System message announcing a join.
    pub fn join(username: &str) -> Self {
        Self {
            kind: MessageType::Join,
            sender: "System".to_string(),
            content: format!("{username} joined the room"),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// System message announcing a leave.
    pub fn leave(username: &str) -> Self {
        Self {
            kind: MessageType::Leave,
            sender: "System".to_string(),
            content: format!("{username} left the room"),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Client → server event, same shape as the outbound payload.
///
/// `JOIN` registers the sender in the connection's room, `CHAT` broadcasts,
/// `LEAVE` deregisters. The `timestamp` field is accepted so well-meaning
/// clients round-trip cleanly, but it is never read.
#[derive(Debug, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl InboundEvent {
    /// Reject malformed events before they cause any side effect.
    pub fn validate(&self) -> Result<(), AppError> {
        match self.kind {
            MessageType::Join => {
                let sender = self.sender.trim();
                if sender.is_empty() {
                    return Err(AppError::Validation("sender must not be empty".into()));
                }
                if sender.len() > MAX_SENDER_LEN {
                    return Err(AppError::Validation(format!(
                        "sender longer than {MAX_SENDER_LEN} characters"
                    )));
                }
            }
            MessageType::Chat => {
                if self.content.is_empty() {
                    return Err(AppError::Validation("content must not be empty".into()));
                }
                if self.content.len() > MAX_CONTENT_LEN {
                    return Err(AppError::Validation(format!(
                        "content longer than {MAX_CONTENT_LEN} characters"
                    )));
                }
            }
            MessageType::Leave => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_wire_shape() {
        let msg = ChatMessage::chat("alice", "hello".to_string());
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"CHAT\""));
        assert!(json.contains("\"sender\":\"alice\""));
        assert!(json.contains("\"content\":\"hello\""));
        // RFC 3339: date, 'T', time
        assert!(json.contains("\"timestamp\":\"2"));
        assert!(json.contains('T'));
    }

    #[test]
    fn test_join_message_is_from_system() {
        let msg = ChatMessage::join("alice");
        assert_eq!(msg.kind, MessageType::Join);
        assert_eq!(msg.sender, "System");
        assert_eq!(msg.content, "alice joined the room");
    }

    #[test]
    fn test_leave_message_is_symmetric() {
        let msg = ChatMessage::leave("bob");
        assert_eq!(msg.kind, MessageType::Leave);
        assert_eq!(msg.sender, "System");
        assert_eq!(msg.content, "bob left the room");
    }

    #[test]
    fn test_inbound_client_timestamp_is_ignored() {
        let json = r#"{"type":"CHAT","sender":"mallory","content":"hi","timestamp":"1970-01-01T00:00:00Z"}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        event.validate().unwrap();
        // Shaped outbound message gets a fresh server timestamp.
        let out = ChatMessage::chat(&event.sender, event.content);
        assert!(out.timestamp.year() >= 2024);
    }

    #[test]
    fn test_inbound_join_requires_sender() {
        let json = r#"{"type":"JOIN","sender":"   "}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_inbound_chat_requires_content() {
        let json = r#"{"type":"CHAT","sender":"alice","content":""}"#;
        let event: InboundEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event.validate(), Err(AppError::Validation(_))));
    }
}
