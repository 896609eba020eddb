//! The chat controller.
//!
//! [`ChatController`] receives user intents, calls the API, and folds the
//! results back into local state.  Intents may interleave: every method takes
//! `&self`, no lock is held across an `.await`, and a result that arrives
//! after its context has moved on is dropped instead of applied.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::StreamExt;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::api::{ChatApi, ReplyStream};
use crate::auth::{AuthStore, RegisterForm};
use crate::credentials::CredentialStore;
use crate::directory::SessionDirectory;
use crate::error::{AppError, Error, FetchOp};
use crate::observability::{
    STREAM_DELTAS, THREAD_SEND_DURATION, THREAD_SENDS_FAILED, THREAD_SENDS_SETTLED,
    THREAD_SENDS_STARTED, THREAD_STALE_DISCARDS,
};
use crate::thread::{SendTicket, ThreadEvent, ThreadItem, ThreadState, Transition};
use crate::types::{ChatSession, Identity, SendMessageParams, SessionId};

/// A snapshot of everything the presentation layer draws.
#[derive(Debug, Clone, Default)]
pub struct ChatView {
    pub identity: Option<Identity>,
    /// False until the stored credential has been checked.
    pub ready: bool,
    pub sessions: Vec<ChatSession>,
    pub active_session_id: Option<SessionId>,
    /// Confirmed and optimistic messages of the active context.
    pub items: Vec<ThreadItem>,
    /// Assistant text received so far while a send is in flight.
    pub streaming: Option<String>,
    /// True while a send is in flight; further sends are refused.
    pub is_loading: bool,
    pub last_error: Option<AppError>,
}

/// How a send ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The exchange is confirmed and shown.
    Settled { session_id: SessionId },
    /// The active context changed before the reply arrived; nothing was applied.
    Discarded,
}

#[derive(Debug, Default)]
struct Inner {
    directory: SessionDirectory,
    thread: ThreadState,
    last_error: Option<AppError>,
    /// Every directory load and local directory edit takes a sequence number;
    /// a load applies only if nothing newer has been applied.
    next_directory_seq: u64,
    applied_directory_seq: u64,
    /// The most recent select intent, as (sequence, session).
    pending_select: Option<(u64, SessionId)>,
    next_select_seq: u64,
}

impl Inner {
    fn take_directory_seq(&mut self) -> u64 {
        self.next_directory_seq += 1;
        self.next_directory_seq
    }

    fn edit_directory(&mut self, edit: impl FnOnce(&mut SessionDirectory)) {
        let seq = self.take_directory_seq();
        self.applied_directory_seq = seq;
        edit(&mut self.directory);
    }

    fn reset(&mut self) {
        self.edit_directory(SessionDirectory::clear);
        self.thread.apply(ThreadEvent::ContextCleared);
        self.pending_select = None;
        self.last_error = None;
    }
}

/// Keeps the session list and active thread consistent with the server.
pub struct ChatController<A: ChatApi + ?Sized> {
    api: Arc<A>,
    auth: AuthStore<A>,
    inner: Mutex<Inner>,
    revision: watch::Sender<u64>,
}

impl<A: ChatApi + ?Sized> ChatController<A> {
    pub fn new(api: Arc<A>, credentials: Arc<dyn CredentialStore>) -> Self {
        let auth = AuthStore::new(Arc::clone(&api), credentials);
        let (revision, _) = watch::channel(0);
        Self {
            api,
            auth,
            inner: Mutex::new(Inner::default()),
            revision,
        }
    }

    pub fn auth(&self) -> &AuthStore<A> {
        &self.auth
    }

    /// A receiver that changes whenever the view may have changed.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let result = {
            let mut inner = self.lock();
            f(&mut inner)
        };
        self.notify();
        result
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn record(&self, err: AppError) -> AppError {
        self.update(|inner| inner.last_error = Some(err.clone()));
        err
    }

    pub fn view(&self) -> ChatView {
        let auth_error = self.auth.last_error();
        let inner = self.lock();
        ChatView {
            identity: self.auth.identity(),
            ready: self.auth.is_ready(),
            sessions: inner.directory.list().to_vec(),
            active_session_id: inner.thread.session_id(),
            items: inner.thread.items().to_vec(),
            streaming: inner.thread.placeholder().map(|p| p.text.clone()),
            is_loading: inner.thread.is_sending(),
            last_error: inner.last_error.clone().or(auth_error),
        }
    }

    pub fn dismiss_error(&self) {
        self.auth.dismiss_error();
        self.update(|inner| inner.last_error = None);
    }

    /// Check the stored credential and, if it is valid, load the session list.
    pub async fn initialize(&self) {
        self.auth.initialize().await;
        self.notify();
        if self.auth.is_authenticated() {
            let _ = self.reload_sessions().await;
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, AppError> {
        let result = self.auth.login(email, password).await;
        self.after_sign_in(result).await
    }

    pub async fn register(&self, form: &RegisterForm) -> Result<Identity, AppError> {
        let result = self.auth.register(form).await;
        self.after_sign_in(result).await
    }

    async fn after_sign_in(
        &self,
        result: Result<Identity, AppError>,
    ) -> Result<Identity, AppError> {
        match result {
            Ok(identity) => {
                self.update(Inner::reset);
                let _ = self.reload_sessions().await;
                Ok(identity)
            }
            Err(err) => {
                self.notify();
                Err(err)
            }
        }
    }

    /// Sign out and drop all per-account state.  In-flight results for the
    /// old account are discarded when they arrive.
    pub fn logout(&self) {
        self.auth.logout();
        self.update(Inner::reset);
    }

    /// Replace the session list with the server's.  On failure the previous
    /// list stays visible.
    pub async fn reload_sessions(&self) -> Result<(), AppError> {
        self.load_sessions().await.map_err(|err| {
            tracing::warn!(error = %err, "could not load sessions");
            self.record(AppError::fetch(FetchOp::ListSessions, err))
        })
    }

    async fn load_sessions(&self) -> Result<(), Error> {
        let generation = self.auth.generation();
        let seq = self.lock().take_directory_seq();
        let result = self.api.sessions().await;
        if self.auth.generation() != generation {
            THREAD_STALE_DISCARDS.click();
            tracing::debug!("discarding session list for a previous account");
            return Ok(());
        }
        let sessions = result?;
        self.update(|inner| {
            if seq > inner.applied_directory_seq {
                inner.applied_directory_seq = seq;
                inner.directory.replace(sessions);
            } else {
                THREAD_STALE_DISCARDS.click();
                tracing::debug!(seq, "discarding superseded session list");
            }
        });
        Ok(())
    }

    /// Make `id` the active context.  On failure the current context is kept.
    pub async fn select_session(&self, id: SessionId) -> Result<(), AppError> {
        let generation = self.auth.generation();
        let (seq, tag) = {
            let mut inner = self.lock();
            inner.next_select_seq += 1;
            let seq = inner.next_select_seq;
            inner.pending_select = Some((seq, id));
            (seq, inner.thread.tag())
        };
        let result = self.api.session(id).await;

        let current = {
            let inner = self.lock();
            self.auth.generation() == generation
                && inner.pending_select == Some((seq, id))
                && inner.thread.tag() == tag
        };
        if !current {
            THREAD_STALE_DISCARDS.click();
            tracing::debug!(session_id = id, "discarding superseded session load");
            return Ok(());
        }

        match result {
            Ok(detail) => {
                self.update(|inner| {
                    inner.pending_select = None;
                    inner.thread.apply(ThreadEvent::ContextLoaded {
                        session_id: id,
                        messages: detail.messages,
                    });
                    if inner.directory.contains(id) {
                        inner.edit_directory(|directory| directory.upsert(detail.session));
                    }
                });
                tracing::debug!(session_id = id, "session selected");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(session_id = id, error = %err, "could not load session");
                self.lock().pending_select = None;
                Err(self.record(AppError::fetch(FetchOp::LoadSession(id), err)))
            }
        }
    }

    /// Switch to an empty, unsaved chat.  No network call.
    pub fn new_chat(&self) {
        self.update(|inner| {
            inner.pending_select = None;
            inner.thread.apply(ThreadEvent::ContextCleared);
        });
    }

    /// Delete a session once the server confirms it.
    ///
    /// Deleting the active session resets to a new chat; a send still in
    /// flight for it is discarded when it resolves.
    pub async fn delete_session(&self, id: SessionId) -> Result<(), AppError> {
        let generation = self.auth.generation();
        let result = self.api.delete_session(id).await;
        if self.auth.generation() != generation {
            THREAD_STALE_DISCARDS.click();
            return Ok(());
        }
        match result {
            Ok(()) => {
                self.update(|inner| {
                    inner.edit_directory(|directory| {
                        directory.remove(id);
                    });
                    if inner.pending_select.is_some_and(|(_, pending)| pending == id) {
                        inner.pending_select = None;
                    }
                    if inner.thread.session_id() == Some(id) {
                        inner.thread.apply(ThreadEvent::ContextCleared);
                    }
                });
                tracing::debug!(session_id = id, "session deleted");
                Ok(())
            }
            Err(err) => {
                tracing::warn!(session_id = id, error = %err, "could not delete session");
                Err(self.record(AppError::fetch(FetchOp::DeleteSession(id), err)))
            }
        }
    }

    /// Rename a session.
    pub async fn rename_session(&self, id: SessionId, title: &str) -> Result<(), AppError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(self.record(AppError::validation("Title cannot be empty")));
        }
        let generation = self.auth.generation();
        let result = self.api.rename_session(id, title.to_string()).await;
        if self.auth.generation() != generation {
            THREAD_STALE_DISCARDS.click();
            return Ok(());
        }
        match result {
            Ok(session) => {
                self.update(|inner| {
                    if inner.directory.contains(id) {
                        inner.edit_directory(|directory| directory.upsert(session));
                    }
                });
                Ok(())
            }
            Err(err) => {
                tracing::warn!(session_id = id, error = %err, "could not rename session");
                Err(self.record(AppError::fetch(FetchOp::RenameSession(id), err)))
            }
        }
    }

    /// Send a message and wait for the confirmed exchange.
    pub async fn send(&self, content: &str) -> Result<SendOutcome, AppError> {
        let ticket = self.begin_send(content)?;
        let started = Instant::now();
        let params = SendMessageParams::new(ticket.content.clone(), ticket.session_id);
        let result = self.api.send_message(params).await;
        THREAD_SEND_DURATION.add(started.elapsed().as_secs_f64());

        match result {
            Ok(response) => {
                let session_id = response.session_id;
                let transition = self.update(|inner| {
                    inner.thread.apply(ThreadEvent::SendSettled {
                        tag: ticket.tag,
                        temp_id: ticket.temp_id,
                        response,
                    })
                });
                self.finish_send(&ticket, transition, session_id).await
            }
            Err(err) => self.fail_send(&ticket, err),
        }
    }

    /// Send a message and show the assistant reply as it streams in.
    ///
    /// Once the stream ends the stored transcript is fetched and replaces the
    /// visible list, so the shown messages carry server ids.
    pub async fn send_streaming(&self, content: &str) -> Result<SendOutcome, AppError> {
        let ticket = self.begin_send(content)?;
        let started = Instant::now();
        let params = SendMessageParams::new(ticket.content.clone(), ticket.session_id);
        let ReplyStream {
            session_id,
            mut deltas,
        } = match self.api.send_message_stream(params).await {
            Ok(reply) => reply,
            Err(err) => return self.fail_send(&ticket, err),
        };

        while let Some(delta) = deltas.next().await {
            let text = match delta {
                Ok(text) => text,
                Err(err) => return self.fail_send(&ticket, err),
            };
            STREAM_DELTAS.click();
            let transition = self.update(|inner| {
                inner.thread.apply(ThreadEvent::StreamDelta {
                    tag: ticket.tag,
                    text,
                })
            });
            if transition == Transition::Discarded {
                // Nobody is showing this reply any more.
                return Ok(self.discard(&ticket));
            }
        }
        THREAD_SEND_DURATION.add(started.elapsed().as_secs_f64());

        match self.api.session(session_id).await {
            Ok(detail) => {
                let transition = self.update(|inner| {
                    let transition = inner.thread.apply(ThreadEvent::TranscriptSettled {
                        tag: ticket.tag,
                        temp_id: ticket.temp_id,
                        session_id,
                        messages: detail.messages,
                    });
                    if transition == Transition::Applied {
                        inner.edit_directory(|directory| directory.upsert(detail.session));
                    }
                    transition
                });
                self.finish_send(&ticket, transition, session_id).await
            }
            Err(err) => self.fail_send(&ticket, err),
        }
    }

    fn begin_send(&self, content: &str) -> Result<SendTicket, AppError> {
        if !self.auth.is_authenticated() {
            return Err(self.record(AppError::auth_message("Sign in to send messages")));
        }
        let transition = self.update(|inner| {
            inner.thread.apply(ThreadEvent::SendStarted {
                content: content.to_string(),
                created_at: OffsetDateTime::now_utc(),
            })
        });
        match transition {
            Transition::Started(ticket) => {
                THREAD_SENDS_STARTED.click();
                tracing::debug!(
                    tag = %ticket.tag,
                    temp_id = %ticket.temp_id,
                    session_id = ?ticket.session_id,
                    "send started"
                );
                Ok(ticket)
            }
            Transition::Rejected(reason) => Err(self.record(AppError::validation(reason))),
            Transition::Applied | Transition::Discarded => {
                Err(self.record(AppError::validation("Message was not sent")))
            }
        }
    }

    async fn finish_send(
        &self,
        ticket: &SendTicket,
        transition: Transition,
        session_id: SessionId,
    ) -> Result<SendOutcome, AppError> {
        if transition != Transition::Applied {
            return Ok(self.discard(ticket));
        }
        THREAD_SENDS_SETTLED.click();
        tracing::debug!(tag = %ticket.tag, session_id, "send settled");
        if ticket.session_id.is_none() {
            // The server created a session; list it.  A failure here only
            // leaves the list stale.
            if let Err(err) = self.load_sessions().await {
                tracing::warn!(error = %err, "could not refresh sessions after new chat");
            }
        }
        Ok(SendOutcome::Settled { session_id })
    }

    fn fail_send(&self, ticket: &SendTicket, err: Error) -> Result<SendOutcome, AppError> {
        let transition = self.update(|inner| {
            let transition = inner.thread.apply(ThreadEvent::SendFailed {
                tag: ticket.tag,
                temp_id: ticket.temp_id,
            });
            if transition == Transition::Applied {
                inner.last_error = Some(AppError::send(err.clone()));
            }
            transition
        });
        if transition != Transition::Applied {
            return Ok(self.discard(ticket));
        }
        THREAD_SENDS_FAILED.click();
        tracing::warn!(tag = %ticket.tag, error = %err, "send failed; rolled back");
        Err(AppError::send(err))
    }

    fn discard(&self, ticket: &SendTicket) -> SendOutcome {
        THREAD_STALE_DISCARDS.click();
        tracing::debug!(tag = %ticket.tag, "discarding reply for an inactive context");
        SendOutcome::Discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::testing::{ApiCall, ScriptedApi, fixtures};
    use crate::types::{Credential, MessageRole};

    async fn signed_in() -> (Arc<ScriptedApi>, ChatController<ScriptedApi>) {
        let api = Arc::new(ScriptedApi::new());
        let credentials = Arc::new(MemoryCredentialStore::with_credential(Credential::new(
            "a", "r",
        )));
        api.push_current_user(Ok(fixtures::identity(1, "ana@example.ca")));
        api.push_sessions(Ok(vec![fixtures::session(7, "RRSP vs TFSA")]));
        let controller = ChatController::new(api.clone(), credentials);
        controller.initialize().await;
        (api, controller)
    }

    fn item_ids(view: &ChatView) -> Vec<Option<i64>> {
        view.items
            .iter()
            .map(|item| item.as_confirmed().map(|m| m.id))
            .collect()
    }

    #[tokio::test]
    async fn initialize_loads_identity_and_sessions() {
        let (_, controller) = signed_in().await;
        let view = controller.view();
        assert!(view.ready);
        assert_eq!(view.identity.map(|i| i.id), Some(1));
        assert_eq!(view.sessions.len(), 1);
        assert_eq!(view.active_session_id, None);
    }

    #[tokio::test]
    async fn optimistic_message_visible_while_sending() {
        let (api, controller) = signed_in().await;
        let gate = api.gate_send();

        let (outcome, ()) = tokio::join!(controller.send("Help me create a monthly budget"), async {
            tokio::task::yield_now().await;
            let view = controller.view();
            assert!(view.is_loading);
            assert_eq!(item_ids(&view), vec![None]);
            assert_eq!(view.streaming.as_deref(), Some(""));
            gate.send(Ok(fixtures::exchange(42, 1, "q", "a"))).unwrap();
        });
        assert_eq!(outcome.unwrap(), SendOutcome::Settled { session_id: 42 });
    }

    #[tokio::test]
    async fn reload_failure_keeps_list() {
        let (api, controller) = signed_in().await;
        api.push_sessions(Err(Error::service_unavailable("down", None)));
        let err = controller.reload_sessions().await.unwrap_err();
        assert!(err.is_fetch());
        let view = controller.view();
        assert_eq!(view.sessions.len(), 1);
        assert!(view.last_error.is_some());

        controller.dismiss_error();
        assert!(controller.view().last_error.is_none());
    }

    #[tokio::test]
    async fn select_failure_keeps_context() {
        let (api, controller) = signed_in().await;
        api.push_session(Ok(fixtures::transcript(
            7,
            "RRSP vs TFSA",
            vec![fixtures::message(1, 7, MessageRole::User, "hi")],
        )));
        controller.select_session(7).await.unwrap();

        api.push_session(Err(Error::not_found("Chat session not found")));
        let err = controller.select_session(9).await.unwrap_err();
        assert!(err.is_fetch());
        let view = controller.view();
        assert_eq!(view.active_session_id, Some(7));
        assert_eq!(item_ids(&view), vec![Some(1)]);
    }

    #[tokio::test]
    async fn latest_select_wins() {
        let (api, controller) = signed_in().await;
        let first = api.gate_session();
        let second = api.gate_session();

        let (a, b, ()) = tokio::join!(
            controller.select_session(7),
            controller.select_session(9),
            async {
                tokio::task::yield_now().await;
                second
                    .send(Ok(fixtures::transcript(9, "Emergency fund", Vec::new())))
                    .unwrap();
                tokio::task::yield_now().await;
                first
                    .send(Ok(fixtures::transcript(7, "RRSP vs TFSA", Vec::new())))
                    .unwrap();
            }
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(controller.view().active_session_id, Some(9));
    }

    #[tokio::test]
    async fn rename_updates_directory() {
        let (api, controller) = signed_in().await;
        assert!(
            controller
                .rename_session(7, "  ")
                .await
                .unwrap_err()
                .is_validation()
        );
        api.push_rename_session(Ok(fixtures::session(7, "Retirement")));
        controller.rename_session(7, "Retirement").await.unwrap();
        assert_eq!(controller.view().sessions[0].title, "Retirement");
        assert!(api.calls().contains(&ApiCall::RenameSession {
            id: 7,
            title: "Retirement".to_string()
        }));
    }

    #[tokio::test]
    async fn concurrent_send_is_rejected() {
        let (api, controller) = signed_in().await;
        let gate = api.gate_send();
        let (first, second) = tokio::join!(controller.send("one"), async {
            let second = controller.send("two").await;
            gate.send(Ok(fixtures::exchange(42, 1, "one", "a"))).unwrap();
            second
        });
        assert!(first.is_ok());
        assert!(second.unwrap_err().is_validation());
        assert_eq!(
            api.count_calls(|call| matches!(call, ApiCall::SendMessage(_))),
            1
        );
    }

    #[tokio::test]
    async fn send_requires_sign_in() {
        let api = Arc::new(ScriptedApi::new());
        let controller = ChatController::new(api.clone(), Arc::new(MemoryCredentialStore::new()));
        controller.initialize().await;
        assert!(controller.send("hi").await.unwrap_err().is_auth());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn logout_discards_in_flight_send() {
        let (api, controller) = signed_in().await;
        let gate = api.gate_send();
        let (outcome, ()) = tokio::join!(controller.send("question"), async {
            tokio::task::yield_now().await;
            controller.logout();
            gate.send(Ok(fixtures::exchange(42, 1, "q", "a"))).unwrap();
        });
        assert_eq!(outcome.unwrap(), SendOutcome::Discarded);
        let view = controller.view();
        assert!(view.identity.is_none());
        assert!(view.items.is_empty());
        assert!(view.sessions.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_revisions() {
        let (_, controller) = signed_in().await;
        let mut rx = controller.subscribe();
        rx.borrow_and_update();
        controller.new_chat();
        assert!(rx.has_changed().unwrap());
    }
}
