//! Canvas view — the client-side mirror of a room.
//!
//! DESIGN
//! ======
//! The server echoes every committed mutation to every session, the sender
//! included, so a client needs no optimistic/confirmed branching. It keeps
//! one `CanvasView`, seeds it from `sync_state`, and feeds every later event
//! through `apply`.
//!
//! Undo and redo go through `Operation::revert` and `Operation::apply`, the
//! same two functions the room uses, so a view that has seen every event
//! holds exactly the strokes of a fresh snapshot.

use crate::model::{ActiveStroke, Cursor, Geometry, Member, MemberId, Operation, RoomId, RoomSnapshot, Stroke};
use crate::protocol::ServerEvent;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanvasView {
    pub room_id: RoomId,
    pub strokes: Vec<Stroke>,
    /// In start order, like `RoomSnapshot::active_strokes`.
    pub active_strokes: Vec<ActiveStroke>,
    pub members: Vec<Member>,
    /// Sorted by member id, like `RoomSnapshot::cursors`.
    pub cursors: Vec<Cursor>,
    pub can_undo: bool,
    pub can_redo: bool,
}

impl CanvasView {
    #[must_use]
    pub fn from_snapshot(snapshot: &RoomSnapshot) -> Self {
        Self {
            room_id: snapshot.room_id.clone(),
            strokes: snapshot.strokes.clone(),
            active_strokes: snapshot.active_strokes.clone(),
            members: snapshot.members.clone(),
            cursors: snapshot.cursors.clone(),
            can_undo: snapshot.can_undo,
            can_redo: snapshot.can_redo,
        }
    }

    /// True when this view shows the same canvas, presence, and undo state
    /// as `snapshot`.
    #[must_use]
    pub fn matches(&self, snapshot: &RoomSnapshot) -> bool {
        *self == Self::from_snapshot(snapshot)
    }

    /// Fold one server event into the view.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::SyncState(snapshot) => *self = Self::from_snapshot(snapshot),
            ServerEvent::StrokeStarted { stroke } => self.start(stroke),
            ServerEvent::StrokeUpdated { stroke_id, points } => {
                let Some(active) = self.active_strokes.iter_mut().find(|s| s.id == *stroke_id) else {
                    return;
                };
                match &mut active.geometry {
                    Geometry::Freehand { points: buffer } => buffer.extend_from_slice(points),
                    Geometry::Shape { end, .. } => {
                        if let Some(last) = points.last() {
                            *end = *last;
                        }
                    }
                }
            }
            ServerEvent::StrokeEnded { stroke, operation, can_undo, can_redo } => {
                self.active_strokes.retain(|s| s.id != stroke.id);
                self.forward(operation, *can_undo, *can_redo);
            }
            ServerEvent::StrokeErased { operation, can_undo, can_redo, .. }
            | ServerEvent::Redone { operation, can_undo, can_redo } => self.forward(operation, *can_undo, *can_redo),
            ServerEvent::Cleared { operation, can_undo, can_redo } => {
                self.active_strokes.clear();
                self.forward(operation, *can_undo, *can_redo);
            }
            ServerEvent::Undone { operation, can_undo, can_redo } => {
                operation.revert(&mut self.strokes);
                self.set_flags(*can_undo, *can_redo);
            }
            ServerEvent::MemberJoined { member } => {
                if !self.members.iter().any(|m| m.id == member.id) {
                    self.members.push(member.clone());
                }
            }
            ServerEvent::MemberLeft { member_id, discarded_strokes } => {
                self.members.retain(|m| m.id != *member_id);
                self.cursors.retain(|c| c.member_id != *member_id);
                self.active_strokes
                    .retain(|s| !discarded_strokes.contains(&s.id));
            }
            ServerEvent::CursorMoved { cursor } => self.upsert_cursor(cursor),
            ServerEvent::Connected { .. } | ServerEvent::SessionSaved { .. } | ServerEvent::Notification { .. } => {}
        }
    }

    #[must_use]
    pub fn member(&self, member_id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == member_id)
    }

    fn start(&mut self, stroke: &ActiveStroke) {
        let at = self
            .active_strokes
            .partition_point(|s| (s.started_at, s.id.as_str()) <= (stroke.started_at, stroke.id.as_str()));
        self.active_strokes.insert(at, stroke.clone());
    }

    fn forward(&mut self, operation: &Operation, can_undo: bool, can_redo: bool) {
        operation.apply(&mut self.strokes);
        self.set_flags(can_undo, can_redo);
    }

    fn set_flags(&mut self, can_undo: bool, can_redo: bool) {
        self.can_undo = can_undo;
        self.can_redo = can_redo;
    }

    fn upsert_cursor(&mut self, cursor: &Cursor) {
        match self
            .cursors
            .binary_search_by_key(&cursor.member_id, |c| c.member_id)
        {
            Ok(i) => self.cursors[i] = cursor.clone(),
            Err(i) => self.cursors.insert(i, cursor.clone()),
        }
    }
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
