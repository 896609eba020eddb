//! An in-memory [`ChatApi`] for tests.
//!
//! [`ScriptedApi`] answers each operation from a queue of scripted replies.
//! A reply is either ready immediately (`push_*`) or held until the test
//! releases it (`gate_*`), which lets a test interleave intents with
//! in-flight requests and resolve them in any order.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use futures::channel::mpsc;
use futures::stream;
use tokio::sync::oneshot;

use crate::api::{ChatApi, ReplyStream};
use crate::error::{Error, Result};
use crate::types::{
    ChatSession, ChatSessionWithMessages, Credential, Identity, LoginParams, RegisterParams,
    SendMessageParams, SendMessageResponse, SessionId,
};

/// A request the scripted API received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    Register { email: String },
    Login { email: String },
    CurrentUser,
    Sessions,
    Session(SessionId),
    DeleteSession(SessionId),
    RenameSession { id: SessionId, title: String },
    SendMessage(SendMessageParams),
    SendMessageStream(SendMessageParams),
}

enum Reply<T> {
    Ready(Result<T>),
    Gated(oneshot::Receiver<Result<T>>),
}

impl<T> Reply<T> {
    async fn resolve(self) -> Result<T> {
        match self {
            Reply::Ready(result) => result,
            Reply::Gated(rx) => rx
                .await
                .unwrap_or_else(|_| Err(Error::connection("scripted reply was dropped", None))),
        }
    }
}

type Queue<T> = VecDeque<Reply<T>>;

#[derive(Default)]
struct Script {
    register: Queue<()>,
    login: Queue<Credential>,
    current_user: Queue<Identity>,
    sessions: Queue<Vec<ChatSession>>,
    session: Queue<ChatSessionWithMessages>,
    delete_session: Queue<()>,
    rename_session: Queue<ChatSession>,
    send_message: Queue<SendMessageResponse>,
    send_message_stream: Queue<ReplyStream>,
    calls: Vec<ApiCall>,
}

/// A [`ChatApi`] that replays scripted replies.
///
/// An operation with nothing queued fails with a connection error.
#[derive(Default)]
pub struct ScriptedApi {
    script: Mutex<Script>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ApiCall> {
        self.lock().calls.clone()
    }

    /// How many calls satisfy `pred`.
    pub fn count_calls(&self, pred: impl Fn(&ApiCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|call| pred(call)).count()
    }

    pub fn push_register(&self, reply: Result<()>) {
        self.lock().register.push_back(Reply::Ready(reply));
    }

    pub fn push_login(&self, reply: Result<Credential>) {
        self.lock().login.push_back(Reply::Ready(reply));
    }

    pub fn gate_login(&self) -> oneshot::Sender<Result<Credential>> {
        gate(&mut self.lock().login)
    }

    pub fn push_current_user(&self, reply: Result<Identity>) {
        self.lock().current_user.push_back(Reply::Ready(reply));
    }

    pub fn gate_current_user(&self) -> oneshot::Sender<Result<Identity>> {
        gate(&mut self.lock().current_user)
    }

    pub fn push_sessions(&self, reply: Result<Vec<ChatSession>>) {
        self.lock().sessions.push_back(Reply::Ready(reply));
    }

    pub fn gate_sessions(&self) -> oneshot::Sender<Result<Vec<ChatSession>>> {
        gate(&mut self.lock().sessions)
    }

    pub fn push_session(&self, reply: Result<ChatSessionWithMessages>) {
        self.lock().session.push_back(Reply::Ready(reply));
    }

    pub fn gate_session(&self) -> oneshot::Sender<Result<ChatSessionWithMessages>> {
        gate(&mut self.lock().session)
    }

    pub fn push_delete_session(&self, reply: Result<()>) {
        self.lock().delete_session.push_back(Reply::Ready(reply));
    }

    pub fn gate_delete_session(&self) -> oneshot::Sender<Result<()>> {
        gate(&mut self.lock().delete_session)
    }

    pub fn push_rename_session(&self, reply: Result<ChatSession>) {
        self.lock().rename_session.push_back(Reply::Ready(reply));
    }

    pub fn push_send(&self, reply: Result<SendMessageResponse>) {
        self.lock().send_message.push_back(Reply::Ready(reply));
    }

    pub fn gate_send(&self) -> oneshot::Sender<Result<SendMessageResponse>> {
        gate(&mut self.lock().send_message)
    }

    /// Script a streamed reply that yields `deltas` and ends.
    pub fn push_stream(&self, session_id: SessionId, deltas: Vec<Result<String>>) {
        let reply = ReplyStream::new(session_id, Box::pin(stream::iter(deltas)));
        self.lock()
            .send_message_stream
            .push_back(Reply::Ready(Ok(reply)));
    }

    /// Script a streaming request that fails before any delta arrives.
    pub fn push_stream_error(&self, err: Error) {
        self.lock()
            .send_message_stream
            .push_back(Reply::Ready(Err(err)));
    }

    /// Script a streamed reply whose deltas the test sends one by one.
    ///
    /// The stream ends when the returned sender is dropped.
    pub fn gate_stream(&self, session_id: SessionId) -> mpsc::UnboundedSender<Result<String>> {
        let (tx, rx) = mpsc::unbounded();
        let reply = ReplyStream::new(session_id, Box::pin(rx));
        self.lock()
            .send_message_stream
            .push_back(Reply::Ready(Ok(reply)));
        tx
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take<T>(
        &self,
        call: ApiCall,
        pick: impl FnOnce(&mut Script) -> &mut Queue<T>,
    ) -> Reply<T> {
        let mut script = self.lock();
        let name = format!("{call:?}");
        script.calls.push(call);
        pick(&mut *script).pop_front().unwrap_or_else(|| {
            Reply::Ready(Err(Error::connection(
                format!("no scripted reply for {name}"),
                None,
            )))
        })
    }
}

fn gate<T>(queue: &mut Queue<T>) -> oneshot::Sender<Result<T>> {
    let (tx, rx) = oneshot::channel();
    queue.push_back(Reply::Gated(rx));
    tx
}

#[async_trait::async_trait]
impl ChatApi for ScriptedApi {
    async fn register(&self, params: RegisterParams) -> Result<()> {
        let call = ApiCall::Register {
            email: params.email.clone(),
        };
        self.take(call, |s| &mut s.register).resolve().await
    }

    async fn login(&self, params: LoginParams) -> Result<Credential> {
        let call = ApiCall::Login {
            email: params.email.clone(),
        };
        self.take(call, |s| &mut s.login).resolve().await
    }

    async fn current_user(&self) -> Result<Identity> {
        self.take(ApiCall::CurrentUser, |s| &mut s.current_user)
            .resolve()
            .await
    }

    async fn sessions(&self) -> Result<Vec<ChatSession>> {
        self.take(ApiCall::Sessions, |s| &mut s.sessions)
            .resolve()
            .await
    }

    async fn session(&self, id: SessionId) -> Result<ChatSessionWithMessages> {
        self.take(ApiCall::Session(id), |s| &mut s.session)
            .resolve()
            .await
    }

    async fn delete_session(&self, id: SessionId) -> Result<()> {
        self.take(ApiCall::DeleteSession(id), |s| &mut s.delete_session)
            .resolve()
            .await
    }

    async fn rename_session(&self, id: SessionId, title: String) -> Result<ChatSession> {
        self.take(ApiCall::RenameSession { id, title }, |s| {
            &mut s.rename_session
        })
        .resolve()
        .await
    }

    async fn send_message(&self, params: SendMessageParams) -> Result<SendMessageResponse> {
        self.take(ApiCall::SendMessage(params), |s| &mut s.send_message)
            .resolve()
            .await
    }

    async fn send_message_stream(&self, params: SendMessageParams) -> Result<ReplyStream> {
        self.take(ApiCall::SendMessageStream(params), |s| {
            &mut s.send_message_stream
        })
        .resolve()
        .await
    }
}

/// Ready-made values for scripting replies.
pub mod fixtures {
    use time::OffsetDateTime;
    use time::macros::datetime;

    use crate::types::{
        ChatMessage, ChatSession, ChatSessionWithMessages, Identity, MessageId, MessageRole,
        SendMessageResponse, SessionId, UserId,
    };

    /// The timestamp every fixture carries.
    pub const CREATED_AT: OffsetDateTime = datetime!(2024-05-02 9:15:00 UTC);

    pub fn identity(id: UserId, email: &str) -> Identity {
        Identity {
            id,
            email: email.to_string(),
            full_name: None,
            is_active: true,
            is_verified: true,
            created_at: CREATED_AT,
        }
    }

    pub fn session(id: SessionId, title: &str) -> ChatSession {
        ChatSession {
            id,
            user_id: 1,
            title: title.to_string(),
            created_at: CREATED_AT,
            updated_at: CREATED_AT,
        }
    }

    pub fn message(
        id: MessageId,
        session_id: SessionId,
        role: MessageRole,
        content: &str,
    ) -> ChatMessage {
        ChatMessage::new(id, session_id, role, content, CREATED_AT)
    }

    /// A session with the given transcript.
    pub fn transcript(
        id: SessionId,
        title: &str,
        messages: Vec<ChatMessage>,
    ) -> ChatSessionWithMessages {
        ChatSessionWithMessages {
            session: session(id, title),
            messages,
        }
    }

    /// A confirmed exchange: the user message gets `user_id`, the reply `user_id + 1`.
    pub fn exchange(
        session_id: SessionId,
        user_id: MessageId,
        question: &str,
        answer: &str,
    ) -> SendMessageResponse {
        SendMessageResponse {
            session_id,
            user_message: message(user_id, session_id, MessageRole::User, question),
            assistant_message: message(user_id + 1, session_id, MessageRole::Assistant, answer),
        }
    }
}
