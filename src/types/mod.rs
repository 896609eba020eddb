// Public modules
pub mod auth_params;
pub mod chat_message;
pub mod chat_session;
pub mod credential;
pub mod identity;
pub mod message_role;
pub mod send_message;

// Re-exports
pub use auth_params::{LoginParams, RefreshParams, RegisterParams};
pub use chat_message::ChatMessage;
pub use chat_session::{ChatSession, ChatSessionWithMessages, SessionUpdateParams};
pub use credential::Credential;
pub use identity::Identity;
pub use message_role::MessageRole;
pub use send_message::{SendMessageParams, SendMessageResponse};

/// Server-assigned id of a chat session.
pub type SessionId = i64;

/// Server-assigned id of a chat message.
pub type MessageId = i64;

/// Server-assigned id of a user.
pub type UserId = i64;
