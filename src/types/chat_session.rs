use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{ChatMessage, SessionId, UserId};

/// A chat session owned by the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    /// Server-assigned session id.
    pub id: SessionId,

    /// The owning user.
    pub user_id: UserId,

    /// Display title.  The server derives it from the first message.
    pub title: String,

    /// When the session was created.
    #[serde(with = "crate::utils::time")]
    pub created_at: OffsetDateTime,

    /// When the session last changed.  Session lists are ordered by this, newest first.
    #[serde(with = "crate::utils::time")]
    pub updated_at: OffsetDateTime,
}

/// A session together with its full transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSessionWithMessages {
    /// The session itself.
    #[serde(flatten)]
    pub session: ChatSession,

    /// Messages in server order (oldest first).
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Body of a session update request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUpdateParams {
    /// New title, if it should change.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SessionUpdateParams {
    /// An update that renames the session.
    pub fn rename(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn session_with_messages_flattens() {
        let json = json!({
            "id": 7,
            "user_id": 3,
            "title": "RRSP vs TFSA",
            "created_at": "2024-05-01T10:00:00+00:00",
            "updated_at": "2024-05-02T10:00:00+00:00",
            "messages": [
                {
                    "id": 1,
                    "session_id": 7,
                    "role": "user",
                    "content": "Explain RRSP vs TFSA differences",
                    "created_at": "2024-05-01T10:00:00+00:00"
                }
            ]
        });
        let detail: ChatSessionWithMessages = serde_json::from_value(json).unwrap();

        assert_eq!(detail.session.id, 7);
        assert_eq!(detail.session.title, "RRSP vs TFSA");
        assert_eq!(detail.session.updated_at, datetime!(2024-05-02 10:00:00 UTC));
        assert_eq!(detail.messages.len(), 1);
        assert_eq!(detail.messages[0].role, MessageRole::User);
    }

    #[test]
    fn session_without_messages_defaults_empty() {
        let json = json!({
            "id": 8,
            "user_id": 3,
            "title": "New Chat",
            "created_at": "2024-05-01T10:00:00",
            "updated_at": "2024-05-01T10:00:00"
        });
        let detail: ChatSessionWithMessages = serde_json::from_value(json).unwrap();
        assert!(detail.messages.is_empty());
    }

    #[test]
    fn rename_params() {
        let json = serde_json::to_value(SessionUpdateParams::rename("Budget")).unwrap();
        assert_eq!(json, json!({"title": "Budget"}));
        let json = serde_json::to_value(SessionUpdateParams::default()).unwrap();
        assert_eq!(json, json!({}));
    }
}
