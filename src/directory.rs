//! The current user's session list.

use crate::types::{ChatSession, SessionId};

/// Sessions in server order, unique by id.
///
/// The directory never calls the network itself; the controller replaces or
/// edits it once the API has answered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDirectory {
    sessions: Vec<ChatSession>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The sessions as of the last successful load.
    pub fn list(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn get(&self, id: SessionId) -> Option<&ChatSession> {
        self.sessions.iter().find(|session| session.id == id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Replace the whole list.  Later duplicates of an id are dropped.
    pub fn replace(&mut self, sessions: Vec<ChatSession>) {
        let mut unique: Vec<ChatSession> = Vec::with_capacity(sessions.len());
        for session in sessions {
            if !unique.iter().any(|s| s.id == session.id) {
                unique.push(session);
            }
        }
        self.sessions = unique;
    }

    /// Update a session in place, or put it first if it is new.
    pub fn upsert(&mut self, session: ChatSession) {
        match self.sessions.iter_mut().find(|s| s.id == session.id) {
            Some(existing) => *existing = session,
            None => self.sessions.insert(0, session),
        }
    }

    /// Remove a session.  Returns whether it was present.
    pub fn remove(&mut self, id: SessionId) -> bool {
        let before = self.sessions.len();
        self.sessions.retain(|session| session.id != id);
        self.sessions.len() != before
    }

    pub fn clear(&mut self) {
        self.sessions.clear();
    }
}
