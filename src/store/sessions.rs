//! In-memory session store, keyed by chat.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::conversation::{ChatId, Session};

/// Live sessions. At most one per chat.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<ChatId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a chat's session.
    pub async fn get(&self, chat_id: ChatId) -> Option<Session> {
        self.sessions.read().await.get(&chat_id).cloned()
    }

    /// Install a session, replacing any previous one for the chat.
    pub async fn insert(&self, session: Session) -> Option<Session> {
        self.sessions.write().await.insert(session.chat_id, session)
    }

    pub async fn remove(&self, chat_id: ChatId) -> Option<Session> {
        self.sessions.write().await.remove(&chat_id)
    }

    /// Mutate an existing session in place. Returns `None` if the chat has
    /// no session.
    pub async fn update<F, R>(&self, chat_id: ChatId, f: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&chat_id).map(f)
    }

    /// Read-modify-write the chat's slot under one lock. The closure may
    /// create, change or clear the session.
    pub async fn transact<F, R>(&self, chat_id: ChatId, f: F) -> R
    where
        F: FnOnce(&mut Option<Session>) -> R,
    {
        let mut sessions = self.sessions.write().await;
        let mut slot = sessions.remove(&chat_id);
        let result = f(&mut slot);
        if let Some(session) = slot {
            sessions.insert(chat_id, session);
        }
        result
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
