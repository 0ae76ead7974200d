//! Broadcast channel — per-room fan-out to subscribed sessions.
//!
//! DESIGN
//! ======
//! Each subscriber is the sending half of a bounded per-session queue. Sends
//! never wait: `try_send` either enqueues or fails, and a failed subscriber
//! is pruned on the spot so one slow or dead reader never stalls the room.
//!
//! The channel holds the only sender for each session queue. Pruning drops
//! it, which ends the session's receiver; the connection task sees that,
//! leaves the room, and closes the socket. The client recovers by
//! reconnecting and taking a fresh snapshot. There is no per-message ack.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::warn;

use crate::model::MemberId;
use crate::protocol::ServerEvent;
use crate::services::room::Outbound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber queue closed")]
    Closed,
    #[error("subscriber queue full")]
    Lagged,
}

impl<T> From<mpsc::error::TrySendError<T>> for DeliveryError {
    fn from(err: mpsc::error::TrySendError<T>) -> Self {
        match err {
            mpsc::error::TrySendError::Full(_) => Self::Lagged,
            mpsc::error::TrySendError::Closed(_) => Self::Closed,
        }
    }
}

#[derive(Debug, Default)]
pub struct BroadcastChannel {
    subscribers: HashMap<MemberId, mpsc::Sender<ServerEvent>>,
}

impl BroadcastChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member's delivery queue, replacing any previous one.
    pub fn subscribe(&mut self, member_id: MemberId, tx: mpsc::Sender<ServerEvent>) {
        self.subscribers.insert(member_id, tx);
    }

    /// Returns `false` if the member was not subscribed (already pruned).
    pub fn unsubscribe(&mut self, member_id: MemberId) -> bool {
        self.subscribers.remove(&member_id).is_some()
    }

    #[must_use]
    pub fn contains(&self, member_id: MemberId) -> bool {
        self.subscribers.contains_key(&member_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Enqueue one event for one member. A failing subscriber is pruned.
    ///
    /// # Errors
    ///
    /// `Closed` or `Lagged` when the queue refused the event. Unknown
    /// members count as `Closed`.
    pub fn send_to(&mut self, member_id: MemberId, event: ServerEvent) -> Result<(), DeliveryError> {
        let Some(tx) = self.subscribers.get(&member_id) else {
            return Err(DeliveryError::Closed);
        };
        let kind = event.kind();
        match tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = DeliveryError::from(err);
                self.prune(member_id, kind, err);
                Err(err)
            }
        }
    }

    /// Enqueue an event for every subscriber. Returns the pruned members.
    pub fn publish(&mut self, event: &ServerEvent) -> Vec<MemberId> {
        let failed: Vec<(MemberId, DeliveryError)> = self
            .subscribers
            .iter()
            .filter_map(|(member_id, tx)| match tx.try_send(event.clone()) {
                Ok(()) => None,
                Err(err) => Some((*member_id, DeliveryError::from(err))),
            })
            .collect();

        let kind = event.kind();
        failed
            .into_iter()
            .map(|(member_id, err)| {
                self.prune(member_id, kind, err);
                member_id
            })
            .collect()
    }

    /// Route the output of a room command, in order. Returns the pruned
    /// members.
    pub fn deliver(&mut self, events: Vec<Outbound>) -> Vec<MemberId> {
        let mut pruned = Vec::new();
        for outbound in events {
            match outbound {
                Outbound::All(event) => pruned.extend(self.publish(&event)),
                Outbound::To(member_id, event) => {
                    if self.send_to(member_id, event).is_err() {
                        pruned.push(member_id);
                    }
                }
            }
        }
        pruned
    }

    fn prune(&mut self, member_id: MemberId, kind: &'static str, err: DeliveryError) {
        if self.subscribers.remove(&member_id).is_some() {
            warn!(%member_id, event = kind, error = %err, "subscriber pruned");
        }
    }
}

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod tests;
