//! Session repository with per-session locking.
//!
//! The map lock is only held to look up or insert a handle; ticks serialize on
//! the per-session [`tokio::sync::Mutex`], so different sessions proceed in
//! parallel while ticks of one session run in arrival order.

use crate::session::SessionSlot;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use time::OffsetDateTime;
use tokio::sync::Mutex;

pub type SessionHandle = Arc<Mutex<SessionSlot>>;

/// Index entry of a stored session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntry {
    pub id: String,
    pub expires_at: OffsetDateTime,
}

pub trait SessionStore: Send + Sync {
    /// Stores `slot` under its session id and returns its handle.
    fn put(&self, slot: SessionSlot) -> SessionHandle;
    fn get(&self, id: &str) -> Option<SessionHandle>;
    fn list(&self) -> Vec<SessionEntry>;
    fn remove(&self, id: &str) -> bool;

    fn len(&self) -> usize {
        self.list().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct StoredSession {
    expires_at: OffsetDateTime,
    handle: SessionHandle,
}

/// Process-local store. Entries live until [`SessionStore::remove`] is called.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, StoredSession>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn put(&self, slot: SessionSlot) -> SessionHandle {
        let id = slot.session.id.clone();
        let expires_at = slot.session.expires_at;
        let handle = Arc::new(Mutex::new(slot));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                StoredSession {
                    expires_at,
                    handle: Arc::clone(&handle),
                },
            );
        handle
    }

    fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|s| Arc::clone(&s.handle))
    }

    fn list(&self) -> Vec<SessionEntry> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, s)| SessionEntry {
                id: id.clone(),
                expires_at: s.expires_at,
            })
            .collect()
    }

    fn remove(&self, id: &str) -> bool {
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some()
    }

    fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
