//! Concurrent session maps.

use super::SessionError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Session id to session map. Ids are never overwritten: a live id has to
/// be removed before it can be inserted again.
pub struct SessionRegistry<T> {
    sessions: DashMap<String, Arc<T>>,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl<T> SessionRegistry<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session under a fresh id.
    pub fn insert(&self, id: impl Into<String>, session: Arc<T>) -> Result<(), SessionError> {
        match self.sessions.entry(id.into()) {
            Entry::Occupied(entry) => Err(SessionError::DuplicateSession(entry.key().clone())),
            Entry::Vacant(entry) => {
                entry.insert(session);
                Ok(())
            }
        }
    }

    /// Look up a session.
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a session. Only the first removal of an id returns it.
    pub fn remove(&self, id: &str) -> Option<Arc<T>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Whether the id is live.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Per-user index: user id to chat id to session id.
#[derive(Default)]
pub struct UserSessions {
    users: DashMap<String, HashMap<String, String>>,
}

impl UserSessions {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `session_id` for the user's chat. Without a chat id the
    /// session id doubles as the chat id.
    pub fn add(&self, user_id: &str, chat_id: Option<&str>, session_id: &str) {
        let chat = chat_id.unwrap_or(session_id).to_string();
        self.users
            .entry(user_id.to_string())
            .or_default()
            .insert(chat, session_id.to_string());
    }

    /// Forget the user's chat entry if it still points at `session_id`.
    pub fn remove(&self, user_id: &str, chat_id: Option<&str>, session_id: &str) {
        let chat = chat_id.unwrap_or(session_id);
        if let Some(mut chats) = self.users.get_mut(user_id) {
            if chats.get(chat).is_some_and(|s| s == session_id) {
                chats.remove(chat);
            }
        }
        self.users.remove_if(user_id, |_, chats| chats.is_empty());
    }

    /// Chat id to session id map of a user.
    pub fn sessions_for_user(&self, user_id: &str) -> HashMap<String, String> {
        self.users
            .get(user_id)
            .map(|chats| chats.value().clone())
            .unwrap_or_default()
    }

    /// Number of users with at least one session.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}
