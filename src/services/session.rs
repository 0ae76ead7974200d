//! Session manager — transport sessions and their room bindings.
//!
//! DESIGN
//! ======
//! A session is one websocket connection. It exists from upgrade to close
//! and is bound to at most one (room, member) pair at a time. The manager
//! also issues the bounded queues that carry room events to a session.
//!
//! Bindings here are bookkeeping for stats and logs; the room itself is the
//! authority on membership.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, mpsc};
use tracing::info;
use uuid::Uuid;

use crate::model::{MemberId, RoomId};
use crate::protocol::{ServerEvent, now_ms};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    pub room_id: RoomId,
    pub member_id: MemberId,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    connected_at: i64,
    binding: Option<Binding>,
}

#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<Uuid, SessionEntry>>>,
    queue_capacity: usize,
}

impl SessionManager {
    #[must_use]
    pub fn new(queue_capacity: usize) -> Self {
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), queue_capacity: queue_capacity.max(1) }
    }

    /// Register a new transport session and return its id.
    pub async fn open(&self) -> Uuid {
        let session_id = Uuid::new_v4();
        let entry = SessionEntry { connected_at: now_ms(), binding: None };
        self.sessions.write().await.insert(session_id, entry);
        info!(%session_id, "session opened");
        session_id
    }

    /// A fresh bounded queue for one room subscription.
    #[must_use]
    pub fn delivery_queue(&self) -> (mpsc::Sender<ServerEvent>, mpsc::Receiver<ServerEvent>) {
        mpsc::channel(self.queue_capacity)
    }

    pub async fn bind(&self, session_id: Uuid, binding: Binding) {
        if let Some(entry) = self.sessions.write().await.get_mut(&session_id) {
            entry.binding = Some(binding);
        }
    }

    pub async fn unbind(&self, session_id: Uuid) -> Option<Binding> {
        self.sessions
            .write()
            .await
            .get_mut(&session_id)
            .and_then(|entry| entry.binding.take())
    }

    pub async fn binding(&self, session_id: Uuid) -> Option<Binding> {
        self.sessions
            .read()
            .await
            .get(&session_id)
            .and_then(|entry| entry.binding.clone())
    }

    /// Forget a session. Returns the binding it still held, if any.
    pub async fn close(&self, session_id: Uuid) -> Option<Binding> {
        let entry = self.sessions.write().await.remove(&session_id)?;
        let lifetime_ms = now_ms().saturating_sub(entry.connected_at);
        info!(%session_id, lifetime_ms, "session closed");
        entry.binding
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Sessions currently bound to a room.
    pub async fn bound_count(&self) -> usize {
        self.sessions
            .read()
            .await
            .values()
            .filter(|entry| entry.binding.is_some())
            .count()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
