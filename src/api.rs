//! The API collaborator the controller talks to.
//!
//! [`ChatApi`] is the seam between the synchronization logic and the network.
//! [`crate::SmartAsset`] implements it over HTTP; [`crate::testing::ScriptedApi`]
//! implements it in memory.  Authenticated operations read the credential
//! themselves, so the trait carries no token arguments.

use std::fmt;
use std::pin::Pin;

use futures::Stream;

use crate::error::Result;
use crate::types::{
    ChatSession, ChatSessionWithMessages, Credential, Identity, LoginParams, RegisterParams,
    SendMessageParams, SendMessageResponse, SessionId,
};

/// A stream of assistant text deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// A streaming reply to a send.
pub struct ReplyStream {
    /// The session the exchange is stored in.
    pub session_id: SessionId,
    /// Text deltas in arrival order; the stream ends when the reply is complete.
    pub deltas: DeltaStream,
}

impl ReplyStream {
    /// Create a reply stream.
    pub fn new(session_id: SessionId, deltas: DeltaStream) -> Self {
        Self {
            session_id,
            deltas,
        }
    }
}

impl fmt::Debug for ReplyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyStream")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// Remote operations used by the auth store and the chat controller.
#[async_trait::async_trait]
pub trait ChatApi: Send + Sync {
    /// Create an account.  Does not sign in.
    async fn register(&self, params: RegisterParams) -> Result<()>;

    /// Exchange an email and password for a credential.
    async fn login(&self, params: LoginParams) -> Result<Credential>;

    /// Fetch the identity behind the current credential.
    async fn current_user(&self) -> Result<Identity>;

    /// Fetch the user's sessions, most recently updated first.
    async fn sessions(&self) -> Result<Vec<ChatSession>>;

    /// Fetch a session and its full transcript.
    async fn session(&self, id: SessionId) -> Result<ChatSessionWithMessages>;

    /// Delete a session.
    async fn delete_session(&self, id: SessionId) -> Result<()>;

    /// Rename a session, returning the updated session.
    async fn rename_session(&self, id: SessionId, title: String) -> Result<ChatSession>;

    /// Send a message and wait for the confirmed exchange.
    async fn send_message(&self, params: SendMessageParams) -> Result<SendMessageResponse>;

    /// Send a message and stream the assistant reply as it is generated.
    async fn send_message_stream(&self, params: SendMessageParams) -> Result<ReplyStream>;
}
