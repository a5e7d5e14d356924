use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use super::ConversationSession;
use crate::gemini_client::ChatBackend;

/// A session is locked for the whole of a turn, so turns never overlap.
pub type SessionHandle = Arc<tokio::sync::Mutex<ConversationSession>>;

struct Entry {
    handle: SessionHandle,
    last_seen: DateTime<Utc>,
}

/// In-memory sessions keyed by the id in the browser's session cookie.
pub struct SessionStore {
    backend: Arc<dyn ChatBackend>,
    idle_ttl: Duration,
    sessions: Mutex<HashMap<Uuid, Entry>>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn ChatBackend>, idle_ttl: Duration) -> Self {
        Self {
            backend,
            idle_ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session for `id`, creating one if the id is absent or unknown.
    pub fn get_or_create(&self, id: Option<Uuid>) -> (Uuid, SessionHandle) {
        let now = Utc::now();
        let mut sessions = self.lock();

        if let Some(id) = id {
            if let Some(entry) = sessions.get_mut(&id) {
                entry.last_seen = now;
                return (id, Arc::clone(&entry.handle));
            }
        }

        let before = sessions.len();
        // A held lock means a turn is in flight; its session is not idle.
        sessions.retain(|_, entry| {
            now - entry.last_seen < self.idle_ttl || entry.handle.try_lock().is_err()
        });
        if sessions.len() < before {
            debug!(pruned = before - sessions.len(), "Pruned idle sessions");
        }

        let id = Uuid::new_v4();
        let handle = Arc::new(tokio::sync::Mutex::new(ConversationSession::new(
            self.backend.start_chat(),
        )));
        sessions.insert(
            id,
            Entry {
                handle: Arc::clone(&handle),
                last_seen: now,
            },
        );
        info!(session = %id, active = sessions.len(), "Started chat session");

        (id, handle)
    }

    pub fn remove(&self, id: &Uuid) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            info!(session = %id, "Cleared chat session");
        }
        removed
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
