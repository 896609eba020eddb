use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, SessionId};

/// Body of a send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageParams {
    /// The user's message.
    pub message: String,

    /// The session to append to.  Absent starts a new session server-side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
}

impl SendMessageParams {
    /// Create send parameters.
    pub fn new(message: impl Into<String>, session_id: Option<SessionId>) -> Self {
        Self {
            message: message.into(),
            session_id,
        }
    }
}

/// The server's reply to a non-streaming send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageResponse {
    /// The session the exchange was stored in (newly created for a new chat).
    pub session_id: SessionId,

    /// The confirmed copy of the user's message.
    pub user_message: ChatMessage,

    /// The assistant's reply.
    pub assistant_message: ChatMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_chat_omits_session_id() {
        let params = SendMessageParams::new("Help me create a monthly budget", None);
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"message": "Help me create a monthly budget"})
        );

        let params = SendMessageParams::new("And for groceries?", Some(42));
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"message": "And for groceries?", "session_id": 42})
        );
    }

    #[test]
    fn response_deserialization() {
        let json = json!({
            "session_id": 42,
            "user_message": {
                "id": 1, "session_id": 42, "role": "user",
                "content": "Help me create a monthly budget",
                "created_at": "2024-05-02T09:15:00"
            },
            "assistant_message": {
                "id": 2, "session_id": 42, "role": "assistant",
                "content": "Start with the 50/30/20 rule.",
                "created_at": "2024-05-02T09:15:03"
            }
        });
        let response: SendMessageResponse = serde_json::from_value(json).unwrap();
        assert_eq!(response.session_id, 42);
        assert_eq!(response.user_message.id, 1);
        assert_eq!(response.assistant_message.id, 2);
    }
}
