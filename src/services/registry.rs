//! Room registry — lazy room lifecycle, membership, and command routing.
//!
//! DESIGN
//! ======
//! The registry maps room ids to live rooms. Each live room pairs the `Room`
//! value with its `BroadcastChannel` behind one async mutex, so a command is
//! admitted, applied, and fanned out in a single critical section. Every
//! subscriber therefore sees events in exactly the order the room admitted
//! them.
//!
//! LOCKING
//! =======
//! The map lock is only held for lookup, insert, and removal, and is always
//! released before a room lock is taken. Rooms never share a lock.
//!
//! LIFECYCLE
//! =========
//! Rooms are created on the first `join` and removed when their last member
//! leaves. An emptied room is marked closed before it leaves the map; a join
//! that races onto a closed room drops it and retries with a fresh one. A
//! room created only for a rejected join is removed again.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{info, warn};

use crate::model::{Member, MemberId, RoomId, RoomSnapshot, SavedSession};
use crate::protocol::{ServerEvent, now_ms};
use crate::services::broadcast::BroadcastChannel;
use crate::services::room::{Command, Departure, Room, RoomError, RoomLimits, validate_room_id};

/// A room and the sessions subscribed to it.
#[derive(Debug)]
pub struct LiveRoom {
    room: Room,
    channel: BroadcastChannel,
}

type RoomHandle = Arc<Mutex<LiveRoom>>;

/// Result of a successful `join`.
#[derive(Debug, Clone)]
pub struct Admission {
    pub member: Member,
    /// The state delivered to the new member as `sync_state`.
    pub snapshot: RoomSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub rooms: usize,
    pub members: usize,
    pub strokes: usize,
    /// Log entries dropped past the retention cap, summed over live rooms.
    pub evicted_operations: u64,
}

#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<RoomId, RoomHandle>>>,
    limits: RoomLimits,
}

impl RoomRegistry {
    #[must_use]
    pub fn new(limits: RoomLimits) -> Self {
        Self { rooms: Arc::new(RwLock::new(HashMap::new())), limits }
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    /// Admit a member, creating the room on first use. The new member's
    /// queue receives `sync_state`; existing members receive
    /// `member_joined`.
    ///
    /// # Errors
    ///
    /// `Validation` for a bad room id or display name, `RoomFull` at the
    /// member cap.
    pub async fn join(
        &self,
        room_id: &str,
        display_name: &str,
        tx: mpsc::Sender<ServerEvent>,
    ) -> Result<Admission, RoomError> {
        validate_room_id(room_id)?;

        loop {
            let handle = self.get_or_create(room_id).await;
            let mut live = handle.lock().await;
            if live.room.is_closed() {
                drop(live);
                self.forget(room_id, &handle).await;
                continue;
            }

            let member = match live.room.admit(display_name, now_ms()) {
                Ok(member) => member,
                Err(err) => {
                    if live.room.is_empty() {
                        live.room.close();
                        drop(live);
                        self.forget(room_id, &handle).await;
                    }
                    return Err(err);
                }
            };

            live.channel
                .publish(&ServerEvent::MemberJoined { member: member.clone() });
            let snapshot = live.room.snapshot();
            live.channel.subscribe(member.id, tx);
            if let Err(err) = live
                .channel
                .send_to(member.id, ServerEvent::SyncState(snapshot.clone()))
            {
                warn!(%room_id, member_id = %member.id, error = %err, "initial sync_state not delivered");
            }
            return Ok(Admission { member, snapshot });
        }
    }

    /// Remove a member and tell the rest of the room. Deletes the room once
    /// it has no members left.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` or `MemberNotFound` if there is nothing to leave.
    pub async fn leave(&self, room_id: &str, member_id: MemberId) -> Result<Departure, RoomError> {
        let handle = self.handle(room_id).await?;
        let mut live = handle.lock().await;

        let departure = live
            .room
            .remove_member(member_id)
            .ok_or(RoomError::MemberNotFound(member_id))?;
        live.channel.unsubscribe(member_id);
        live.channel.publish(&ServerEvent::MemberLeft {
            member_id,
            discarded_strokes: departure.discarded.clone(),
        });

        if live.room.is_empty() {
            live.room.close();
            drop(live);
            self.forget(room_id, &handle).await;
        }
        Ok(departure)
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    /// Apply a command for a member and fan out the resulting events.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` for an unknown or closed room, otherwise whatever the
    /// room rejected the command with.
    pub async fn apply(&self, room_id: &str, member_id: MemberId, command: Command) -> Result<(), RoomError> {
        let handle = self.handle(room_id).await?;
        let mut live = handle.lock().await;
        if live.room.is_closed() {
            return Err(RoomError::RoomNotFound(room_id.to_string()));
        }

        let events = live.room.apply(member_id, command, now_ms())?;
        live.channel.deliver(events);
        Ok(())
    }

    /// Best-effort cursor upsert, broadcast as `cursor_moved`.
    ///
    /// # Errors
    ///
    /// Same as `apply`.
    pub async fn update_cursor(&self, room_id: &str, member_id: MemberId, x: f64, y: f64, drawing: bool) -> Result<(), RoomError> {
        self.apply(room_id, member_id, Command::CursorMove { x, y, drawing })
            .await
    }

    /// Queue a fresh `sync_state` on the member's own channel, behind any
    /// events already queued for it.
    ///
    /// # Errors
    ///
    /// Same as `apply`.
    pub async fn resync(&self, room_id: &str, member_id: MemberId) -> Result<(), RoomError> {
        self.apply(room_id, member_id, Command::Resync).await
    }

    /// Export the room for `save_session`.
    ///
    /// # Errors
    ///
    /// `RoomNotFound` or `MemberNotFound`.
    pub async fn export(&self, room_id: &str, member_id: MemberId) -> Result<SavedSession, RoomError> {
        let handle = self.handle(room_id).await?;
        let live = handle.lock().await;
        live.room.export(member_id, now_ms())
    }

    // =========================================================================
    // MAINTENANCE
    // =========================================================================

    /// Purge idle cursors in every room. Nobody is notified.
    pub async fn sweep_cursors(&self, now: i64, idle_ms: i64) -> usize {
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        let mut purged = 0;
        for handle in handles {
            purged += handle.lock().await.room.sweep_cursors(now, idle_ms);
        }
        purged
    }

    pub async fn snapshot(&self, room_id: &str) -> Option<RoomSnapshot> {
        let handle = self.rooms.read().await.get(room_id).cloned()?;
        let live = handle.lock().await;
        Some(live.room.snapshot())
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn stats(&self) -> RegistryStats {
        let handles: Vec<RoomHandle> = self.rooms.read().await.values().cloned().collect();
        let mut stats = RegistryStats { rooms: handles.len(), members: 0, strokes: 0, evicted_operations: 0 };
        for handle in handles {
            let live = handle.lock().await;
            stats.members += live.room.members().len();
            stats.strokes += live.room.strokes().len();
            stats.evicted_operations += live.room.history().evicted();
        }
        stats
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn handle(&self, room_id: &str) -> Result<RoomHandle, RoomError> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .cloned()
            .ok_or_else(|| RoomError::RoomNotFound(room_id.to_string()))
    }

    async fn get_or_create(&self, room_id: &str) -> RoomHandle {
        if let Some(handle) = self.rooms.read().await.get(room_id) {
            return handle.clone();
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                info!(%room_id, "room created");
                Arc::new(Mutex::new(LiveRoom {
                    room: Room::new(room_id.to_string(), self.limits, now_ms()),
                    channel: BroadcastChannel::new(),
                }))
            })
            .clone()
    }

    /// Drop a room from the map, but only if the map still points at this
    /// exact handle.
    async fn forget(&self, room_id: &str, handle: &RoomHandle) {
        let mut rooms = self.rooms.write().await;
        if rooms
            .get(room_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
        {
            rooms.remove(room_id);
            info!(%room_id, remaining = rooms.len(), "room removed");
        }
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
