use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{MessageId, MessageRole, SessionId};

/// A server-confirmed message in a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned message id.
    pub id: MessageId,

    /// The session this message belongs to.
    pub session_id: SessionId,

    /// Who wrote the message.
    pub role: MessageRole,

    /// Message body.  Rendering (markdown or otherwise) is the caller's concern.
    pub content: String,

    /// When the server stored the message.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,
}

impl ChatMessage {
    /// Create a new message.
    pub fn new(
        id: MessageId,
        session_id: SessionId,
        role: MessageRole,
        content: impl Into<String>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            session_id,
            role,
            content: content.into(),
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn chat_message_deserialization() {
        let json = json!({
            "id": 12,
            "session_id": 7,
            "role": "assistant",
            "content": "A TFSA lets your investments grow tax-free.",
            "created_at": "2024-05-02T09:15:00"
        });
        let message: ChatMessage = serde_json::from_value(json).unwrap();

        assert_eq!(message.id, 12);
        assert_eq!(message.session_id, 7);
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.created_at, datetime!(2024-05-02 9:15:00 UTC));
    }

    #[test]
    fn chat_message_serialization() {
        let message = ChatMessage::new(
            1,
            42,
            MessageRole::User,
            "Help me create a monthly budget",
            datetime!(2024-05-02 9:15:00 UTC),
        );
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(
            json,
            json!({
                "id": 1,
                "session_id": 42,
                "role": "user",
                "content": "Help me create a monthly budget",
                "created_at": "2024-05-02T09:15:00Z"
            })
        );
    }
}
