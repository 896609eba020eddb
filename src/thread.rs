//! The message thread of the active context.
//!
//! [`ThreadState`] is a pure reducer: every change goes through
//! [`ThreadState::apply`], which never touches the network.  The controller
//! feeds it intents and API results; tests feed it events directly.
//!
//! Each context (a loaded session, or the unsaved new chat) gets a fresh
//! [`ContextTag`].  A send remembers the tag it was issued under, and results
//! carrying an older tag are discarded rather than applied to whatever
//! transcript is now on screen.

use std::fmt;

use time::OffsetDateTime;

use crate::types::{ChatMessage, MessageRole, SendMessageResponse, SessionId};

/// Identifies one active context.  Bumped whenever the transcript is replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextTag(u64);

impl ContextTag {
    fn next(self) -> Self {
        ContextTag(self.0 + 1)
    }
}

impl fmt::Display for ContextTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Client-generated id of an optimistic message.
///
/// Never reused for the lifetime of a [`ThreadState`], so an id cannot collide
/// with a message left over from an earlier context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TempId(u64);

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

/// A user message shown before the server has confirmed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimisticMessage {
    pub temp_id: TempId,
    /// The session the message was sent to; `None` for a new chat.
    pub session_id: Option<SessionId>,
    pub content: String,
    /// Local clock at the time of the send intent.
    pub created_at: OffsetDateTime,
}

/// One entry of the visible transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadItem {
    Confirmed(ChatMessage),
    Optimistic(OptimisticMessage),
}

impl ThreadItem {
    pub fn role(&self) -> MessageRole {
        match self {
            ThreadItem::Confirmed(message) => message.role,
            ThreadItem::Optimistic(_) => MessageRole::User,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            ThreadItem::Confirmed(message) => &message.content,
            ThreadItem::Optimistic(message) => &message.content,
        }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        match self {
            ThreadItem::Confirmed(message) => message.created_at,
            ThreadItem::Optimistic(message) => message.created_at,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, ThreadItem::Optimistic(_))
    }

    /// The confirmed message, if the server has acknowledged this item.
    pub fn as_confirmed(&self) -> Option<&ChatMessage> {
        match self {
            ThreadItem::Confirmed(message) => Some(message),
            ThreadItem::Optimistic(_) => None,
        }
    }
}

/// Assistant text received so far for the in-flight send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingPlaceholder {
    pub tag: ContextTag,
    pub text: String,
}

/// Where the most recent send of the active context stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SendPhase {
    #[default]
    Idle,
    Sending {
        tag: ContextTag,
        temp_id: TempId,
    },
    Settled,
    Failed,
}

/// Everything the caller needs to issue the request for a started send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    pub tag: ContextTag,
    pub temp_id: TempId,
    /// The active session at the time of the send; `None` for a new chat.
    pub session_id: Option<SessionId>,
    /// The trimmed message text.
    pub content: String,
}

/// An input to the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadEvent {
    /// A session transcript became the active context.
    ContextLoaded {
        session_id: SessionId,
        messages: Vec<ChatMessage>,
    },
    /// The active context became the empty new chat.
    ContextCleared,
    /// The user asked to send a message.
    SendStarted {
        content: String,
        created_at: OffsetDateTime,
    },
    /// A piece of streamed assistant text arrived.
    StreamDelta { tag: ContextTag, text: String },
    /// The server confirmed a send.
    SendSettled {
        tag: ContextTag,
        temp_id: TempId,
        response: SendMessageResponse,
    },
    /// A streamed send finished and the stored transcript was fetched.
    TranscriptSettled {
        tag: ContextTag,
        temp_id: TempId,
        session_id: SessionId,
        messages: Vec<ChatMessage>,
    },
    /// A send failed.
    SendFailed { tag: ContextTag, temp_id: TempId },
}

/// What applying an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The state changed.
    Applied,
    /// A send began; issue the request described by the ticket.
    Started(SendTicket),
    /// The event belonged to a context that is no longer active.
    Discarded,
    /// The intent was refused; the state is unchanged.
    Rejected(String),
}

/// The visible thread of the active context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadState {
    tag: ContextTag,
    next_temp_id: u64,
    session_id: Option<SessionId>,
    items: Vec<ThreadItem>,
    placeholder: Option<StreamingPlaceholder>,
    phase: SendPhase,
}

impl ThreadState {
    /// An empty new-chat context.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tag(&self) -> ContextTag {
        self.tag
    }

    /// The active session, or `None` for a new chat.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn items(&self) -> &[ThreadItem] {
        &self.items
    }

    pub fn placeholder(&self) -> Option<&StreamingPlaceholder> {
        self.placeholder.as_ref()
    }

    pub fn phase(&self) -> SendPhase {
        self.phase
    }

    pub fn is_sending(&self) -> bool {
        matches!(self.phase, SendPhase::Sending { .. })
    }

    /// Confirmed messages only, in display order.
    pub fn confirmed(&self) -> impl Iterator<Item = &ChatMessage> {
        self.items.iter().filter_map(ThreadItem::as_confirmed)
    }

    /// Apply one event.
    pub fn apply(&mut self, event: ThreadEvent) -> Transition {
        match event {
            ThreadEvent::ContextLoaded {
                session_id,
                messages,
            } => {
                self.switch_context(Some(session_id), messages);
                Transition::Applied
            }
            ThreadEvent::ContextCleared => {
                self.switch_context(None, Vec::new());
                Transition::Applied
            }
            ThreadEvent::SendStarted {
                content,
                created_at,
            } => self.start_send(content, created_at),
            ThreadEvent::StreamDelta { tag, text } => {
                if !self.is_current(tag) {
                    return Transition::Discarded;
                }
                match self.placeholder.as_mut() {
                    Some(placeholder) => {
                        placeholder.text.push_str(&text);
                        Transition::Applied
                    }
                    None => Transition::Discarded,
                }
            }
            ThreadEvent::SendSettled {
                tag,
                temp_id,
                response,
            } => {
                if !self.owns_send(tag, temp_id) {
                    return Transition::Discarded;
                }
                self.remove_optimistic(temp_id);
                if self.session_id.is_none() {
                    self.session_id = Some(response.session_id);
                }
                // User before assistant, whatever order the server produced them in.
                self.push_confirmed(response.user_message);
                self.push_confirmed(response.assistant_message);
                self.settle(SendPhase::Settled);
                Transition::Applied
            }
            ThreadEvent::TranscriptSettled {
                tag,
                temp_id,
                session_id,
                messages,
            } => {
                if !self.owns_send(tag, temp_id) {
                    return Transition::Discarded;
                }
                self.session_id = Some(session_id);
                self.items = messages.into_iter().map(ThreadItem::Confirmed).collect();
                self.settle(SendPhase::Settled);
                Transition::Applied
            }
            ThreadEvent::SendFailed { tag, temp_id } => {
                if !self.owns_send(tag, temp_id) {
                    return Transition::Discarded;
                }
                self.remove_optimistic(temp_id);
                self.settle(SendPhase::Failed);
                Transition::Applied
            }
        }
    }

    fn switch_context(&mut self, session_id: Option<SessionId>, messages: Vec<ChatMessage>) {
        self.tag = self.tag.next();
        self.session_id = session_id;
        self.items = messages.into_iter().map(ThreadItem::Confirmed).collect();
        self.placeholder = None;
        self.phase = SendPhase::Idle;
    }

    fn start_send(&mut self, content: String, created_at: OffsetDateTime) -> Transition {
        let content = content.trim();
        if content.is_empty() {
            return Transition::Rejected("Message cannot be empty".to_string());
        }
        if self.is_sending() {
            return Transition::Rejected("A message is already being sent".to_string());
        }
        let temp_id = TempId(self.next_temp_id);
        self.next_temp_id += 1;
        self.items.push(ThreadItem::Optimistic(OptimisticMessage {
            temp_id,
            session_id: self.session_id,
            content: content.to_string(),
            created_at,
        }));
        self.placeholder = Some(StreamingPlaceholder {
            tag: self.tag,
            text: String::new(),
        });
        self.phase = SendPhase::Sending {
            tag: self.tag,
            temp_id,
        };
        Transition::Started(SendTicket {
            tag: self.tag,
            temp_id,
            session_id: self.session_id,
            content: content.to_string(),
        })
    }

    fn is_current(&self, tag: ContextTag) -> bool {
        matches!(self.phase, SendPhase::Sending { tag: t, .. } if t == tag) && self.tag == tag
    }

    fn owns_send(&self, tag: ContextTag, temp_id: TempId) -> bool {
        self.tag == tag && self.phase == SendPhase::Sending { tag, temp_id }
    }

    fn remove_optimistic(&mut self, temp_id: TempId) {
        self.items
            .retain(|item| !matches!(item, ThreadItem::Optimistic(m) if m.temp_id == temp_id));
    }

    fn push_confirmed(&mut self, message: ChatMessage) {
        let duplicate = self
            .confirmed()
            .any(|existing| existing.id == message.id);
        if !duplicate {
            self.items.push(ThreadItem::Confirmed(message));
        }
    }

    fn settle(&mut self, phase: SendPhase) {
        self.placeholder = None;
        self.phase = phase;
    }
}

/// Apply `event` to `state`, returning the new state and what happened.
pub fn reduce(mut state: ThreadState, event: ThreadEvent) -> (ThreadState, Transition) {
    let transition = state.apply(event);
    (state, transition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-02 9:15:00 UTC);

    fn message(id: i64, session_id: SessionId, role: MessageRole, content: &str) -> ChatMessage {
        ChatMessage::new(id, session_id, role, content, NOW)
    }

    fn exchange(session_id: SessionId, user_id: i64) -> SendMessageResponse {
        SendMessageResponse {
            session_id,
            user_message: message(user_id, session_id, MessageRole::User, "question"),
            assistant_message: message(user_id + 1, session_id, MessageRole::Assistant, "answer"),
        }
    }

    fn loaded(session_id: SessionId) -> ThreadState {
        let mut state = ThreadState::new();
        state.apply(ThreadEvent::ContextLoaded {
            session_id,
            messages: vec![
                message(1, session_id, MessageRole::User, "Explain RRSP vs TFSA differences"),
                message(2, session_id, MessageRole::Assistant, "An RRSP defers tax."),
            ],
        });
        state
    }

    fn start(state: &mut ThreadState, content: &str) -> SendTicket {
        match state.apply(ThreadEvent::SendStarted {
            content: content.to_string(),
            created_at: NOW,
        }) {
            Transition::Started(ticket) => ticket,
            other => panic!("send did not start: {other:?}"),
        }
    }

    fn ids(state: &ThreadState) -> Vec<i64> {
        state.confirmed().map(|m| m.id).collect()
    }

    #[test]
    fn send_inserts_optimistic_message_and_placeholder() {
        let mut state = loaded(7);
        let ticket = start(&mut state, "  What about my RESP?  ");

        assert_eq!(ticket.session_id, Some(7));
        assert_eq!(ticket.content, "What about my RESP?");
        assert_eq!(state.items().len(), 3);
        assert!(state.items()[2].is_optimistic());
        assert_eq!(state.items()[2].content(), "What about my RESP?");
        assert_eq!(state.placeholder().map(|p| p.text.as_str()), Some(""));
        assert!(state.is_sending());
    }

    #[test]
    fn settle_replaces_optimistic_with_confirmed_pair() {
        let mut state = loaded(7);
        let ticket = start(&mut state, "question");
        let transition = state.apply(ThreadEvent::SendSettled {
            tag: ticket.tag,
            temp_id: ticket.temp_id,
            response: exchange(7, 3),
        });

        assert_eq!(transition, Transition::Applied);
        assert_eq!(ids(&state), vec![1, 2, 3, 4]);
        assert!(state.items().iter().all(|item| !item.is_optimistic()));
        assert!(state.placeholder().is_none());
        assert_eq!(state.phase(), SendPhase::Settled);
        assert_eq!(state.items()[2].role(), MessageRole::User);
        assert_eq!(state.items()[3].role(), MessageRole::Assistant);
    }

    #[test]
    fn new_chat_adopts_session_from_response() {
        let mut state = ThreadState::new();
        let ticket = start(&mut state, "Help me create a monthly budget");
        assert_eq!(ticket.session_id, None);

        state.apply(ThreadEvent::SendSettled {
            tag: ticket.tag,
            temp_id: ticket.temp_id,
            response: exchange(42, 1),
        });
        assert_eq!(state.session_id(), Some(42));
        assert_eq!(ids(&state), vec![1, 2]);
        assert_eq!(state.tag(), ticket.tag);
    }

    #[test]
    fn failure_rolls_back_exactly() {
        let mut state = loaded(7);
        let before = state.items().to_vec();
        let ticket = start(&mut state, "question");
        state.apply(ThreadEvent::StreamDelta {
            tag: ticket.tag,
            text: "partial".to_string(),
        });

        let transition = state.apply(ThreadEvent::SendFailed {
            tag: ticket.tag,
            temp_id: ticket.temp_id,
        });
        assert_eq!(transition, Transition::Applied);
        assert_eq!(state.items(), before.as_slice());
        assert!(state.placeholder().is_none());
        assert_eq!(state.phase(), SendPhase::Failed);
    }

    #[test]
    fn stale_results_are_discarded_after_switch() {
        let mut state = loaded(7);
        let ticket = start(&mut state, "question");
        state.apply(ThreadEvent::ContextLoaded {
            session_id: 9,
            messages: vec![message(20, 9, MessageRole::User, "other chat")],
        });
        let after_switch = state.clone();

        for event in [
            ThreadEvent::StreamDelta {
                tag: ticket.tag,
                text: "late".to_string(),
            },
            ThreadEvent::SendSettled {
                tag: ticket.tag,
                temp_id: ticket.temp_id,
                response: exchange(7, 3),
            },
            ThreadEvent::SendFailed {
                tag: ticket.tag,
                temp_id: ticket.temp_id,
            },
        ] {
            assert_eq!(state.apply(event), Transition::Discarded);
            assert_eq!(state, after_switch);
        }
    }

    #[test]
    fn stale_results_are_discarded_after_new_chat() {
        let mut state = loaded(7);
        let ticket = start(&mut state, "question");
        state.apply(ThreadEvent::ContextCleared);
        assert!(!state.is_sending());
        assert!(state.items().is_empty());

        let transition = state.apply(ThreadEvent::SendSettled {
            tag: ticket.tag,
            temp_id: ticket.temp_id,
            response: exchange(7, 3),
        });
        assert_eq!(transition, Transition::Discarded);
        assert!(state.items().is_empty());
        assert_eq!(state.session_id(), None);
    }

    #[test]
    fn reloading_same_session_still_discards() {
        let mut state = loaded(7);
        let ticket = start(&mut state, "question");
        state.apply(ThreadEvent::ContextLoaded {
            session_id: 7,
            messages: Vec::new(),
        });
        let transition = state.apply(ThreadEvent::SendFailed {
            tag: ticket.tag,
            temp_id: ticket.temp_id,
        });
        assert_eq!(transition, Transition::Discarded);
    }

    #[test]
    fn rejects_empty_and_concurrent_sends() {
        let mut state = loaded(7);
        let before = state.clone();
        assert!(matches!(
            state.apply(ThreadEvent::SendStarted {
                content: " \n\t".to_string(),
                created_at: NOW,
            }),
            Transition::Rejected(_)
        ));
        assert_eq!(state, before);

        start(&mut state, "first");
        let during = state.clone();
        assert!(matches!(
            state.apply(ThreadEvent::SendStarted {
                content: "second".to_string(),
                created_at: NOW,
            }),
            Transition::Rejected(_)
        ));
        assert_eq!(state, during);
    }

    #[test]
    fn temp_ids_are_never_reused() {
        let mut state = loaded(7);
        let first = start(&mut state, "one");
        state.apply(ThreadEvent::SendFailed {
            tag: first.tag,
            temp_id: first.temp_id,
        });
        state.apply(ThreadEvent::ContextCleared);
        let second = start(&mut state, "two");
        assert_ne!(first.temp_id, second.temp_id);
        assert_eq!(second.temp_id.to_string(), "tmp-1");
    }

    #[test]
    fn settle_from_settled_or_failed_reenters_sending() {
        let mut state = loaded(7);
        let first = start(&mut state, "one");
        state.apply(ThreadEvent::SendFailed {
            tag: first.tag,
            temp_id: first.temp_id,
        });
        let second = start(&mut state, "two");
        state.apply(ThreadEvent::SendSettled {
            tag: second.tag,
            temp_id: second.temp_id,
            response: exchange(7, 3),
        });
        let third = start(&mut state, "three");
        assert!(state.is_sending());

        // A settle for the earlier, finished send must not touch the new one.
        let transition = state.apply(ThreadEvent::SendSettled {
            tag: second.tag,
            temp_id: second.temp_id,
            response: exchange(7, 5),
        });
        assert_eq!(transition, Transition::Discarded);
        assert!(state.items().last().is_some_and(ThreadItem::is_optimistic));
        assert_eq!(state.phase(), SendPhase::Sending {
            tag: third.tag,
            temp_id: third.temp_id,
        });
    }

    #[test]
    fn deltas_accumulate_in_placeholder() {
        let mut state = loaded(7);
        let ticket = start(&mut state, "question");
        for text in ["Start ", "with a ", "budget."] {
            assert_eq!(
                state.apply(ThreadEvent::StreamDelta {
                    tag: ticket.tag,
                    text: text.to_string(),
                }),
                Transition::Applied
            );
        }
        assert_eq!(
            state.placeholder().map(|p| p.text.as_str()),
            Some("Start with a budget.")
        );
    }

    #[test]
    fn transcript_settle_replaces_list() {
        let mut state = ThreadState::new();
        let ticket = start(&mut state, "question");
        let transition = state.apply(ThreadEvent::TranscriptSettled {
            tag: ticket.tag,
            temp_id: ticket.temp_id,
            session_id: 42,
            messages: vec![
                message(1, 42, MessageRole::User, "question"),
                message(2, 42, MessageRole::Assistant, "answer"),
            ],
        });
        assert_eq!(transition, Transition::Applied);
        assert_eq!(state.session_id(), Some(42));
        assert_eq!(ids(&state), vec![1, 2]);
        assert!(state.placeholder().is_none());
    }

    #[test]
    fn duplicate_confirmed_message_is_not_repeated() {
        let mut state = loaded(7);
        let ticket = start(&mut state, "question");
        let mut response = exchange(7, 3);
        response.user_message.id = 2;
        state.apply(ThreadEvent::SendSettled {
            tag: ticket.tag,
            temp_id: ticket.temp_id,
            response,
        });
        assert_eq!(ids(&state), vec![1, 2, 4]);
    }

    #[test]
    fn reduce_is_functional() {
        let state = loaded(7);
        let (next, transition) = reduce(state.clone(), ThreadEvent::ContextCleared);
        assert_eq!(transition, Transition::Applied);
        assert_eq!(state.session_id(), Some(7));
        assert_eq!(next.session_id(), None);
        assert!(next.tag() > state.tag());
    }
}
