//! Wire protocol — typed inbound messages and outbound events.
//!
//! ARCHITECTURE
//! ============
//! Clients send `ClientMessage` JSON text frames over the websocket; the room
//! engine answers with `ServerEvent`s. Both are `type`-tagged unions, so the
//! boundary handles every kind exhaustively and never casts an opaque
//! payload.
//!
//! DESIGN
//! ======
//! - The server stamps identity and time. Clients never send a member id or
//!   a timestamp that is trusted for ordering.
//! - Every committed mutation is echoed to all sessions of the room,
//!   including the one that caused it. `connected`, `session_saved` and
//!   error notifications are the only events addressed to one session.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    ActiveStroke, Cursor, Geometry, Member, MemberId, Operation, Point, RoomId, RoomSnapshot, SavedSession,
    Stroke, StrokeId, Tool,
};

// =============================================================================
// ERROR CODES
// =============================================================================

/// Grepable error code for structured error notifications.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn level(&self) -> NotificationLevel {
        NotificationLevel::Error
    }
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// INBOUND
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join {
        room_id: RoomId,
        display_name: String,
    },
    Leave,
    StrokeStart {
        /// Server assigns an id when omitted.
        #[serde(default)]
        stroke_id: Option<StrokeId>,
        point: Point,
        color: String,
        width: f64,
        tool: Tool,
        #[serde(default)]
        filled: bool,
    },
    StrokeUpdate {
        stroke_id: StrokeId,
        points: Vec<Point>,
    },
    StrokeEnd {
        stroke_id: StrokeId,
        #[serde(default)]
        geometry: Option<Geometry>,
    },
    StrokeErase {
        stroke_id: StrokeId,
    },
    CursorMove {
        x: f64,
        y: f64,
        #[serde(default)]
        drawing: bool,
    },
    Undo,
    Redo,
    Clear,
    /// Ask for a fresh `sync_state` after a suspected delivery gap.
    Sync,
    SaveSession,
    LoadSession {
        session: SavedSession,
    },
}

impl ClientMessage {
    /// Short kind name used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Leave => "leave",
            ClientMessage::StrokeStart { .. } => "stroke_start",
            ClientMessage::StrokeUpdate { .. } => "stroke_update",
            ClientMessage::StrokeEnd { .. } => "stroke_end",
            ClientMessage::StrokeErase { .. } => "stroke_erase",
            ClientMessage::CursorMove { .. } => "cursor_move",
            ClientMessage::Undo => "undo",
            ClientMessage::Redo => "redo",
            ClientMessage::Clear => "clear",
            ClientMessage::Sync => "sync",
            ClientMessage::SaveSession => "save_session",
            ClientMessage::LoadSession { .. } => "load_session",
        }
    }

    /// High-rate messages that are not logged individually.
    #[must_use]
    pub fn is_hot(&self) -> bool {
        matches!(self, ClientMessage::StrokeUpdate { .. } | ClientMessage::CursorMove { .. })
    }
}

// =============================================================================
// OUTBOUND
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        session_id: Uuid,
    },
    SyncState(RoomSnapshot),
    StrokeStarted {
        stroke: ActiveStroke,
    },
    StrokeUpdated {
        stroke_id: StrokeId,
        points: Vec<Point>,
    },
    StrokeEnded {
        stroke: Stroke,
        operation: Operation,
        can_undo: bool,
        can_redo: bool,
    },
    StrokeErased {
        stroke_id: StrokeId,
        operation: Operation,
        can_undo: bool,
        can_redo: bool,
    },
    Undone {
        operation: Operation,
        can_undo: bool,
        can_redo: bool,
    },
    Redone {
        operation: Operation,
        can_undo: bool,
        can_redo: bool,
    },
    Cleared {
        operation: Operation,
        can_undo: bool,
        can_redo: bool,
    },
    MemberJoined {
        member: Member,
    },
    MemberLeft {
        member_id: MemberId,
        /// Active strokes the member abandoned mid-draw.
        discarded_strokes: Vec<StrokeId>,
    },
    CursorMoved {
        cursor: Cursor,
    },
    SessionSaved {
        session_id: Uuid,
    },
    Notification {
        message: String,
        level: NotificationLevel,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerEvent {
    #[must_use]
    pub fn notification(level: NotificationLevel, message: impl Into<String>) -> Self {
        ServerEvent::Notification { message: message.into(), level, code: None }
    }

    /// Structured notification for a typed error, addressed to the sender.
    #[must_use]
    pub fn from_error(err: &(impl ErrorCode + ?Sized)) -> Self {
        ServerEvent::Notification {
            message: err.to_string(),
            level: err.level(),
            code: Some(err.error_code().to_string()),
        }
    }

    /// Short kind name used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::SyncState(_) => "sync_state",
            ServerEvent::StrokeStarted { .. } => "stroke_started",
            ServerEvent::StrokeUpdated { .. } => "stroke_updated",
            ServerEvent::StrokeEnded { .. } => "stroke_ended",
            ServerEvent::StrokeErased { .. } => "stroke_erased",
            ServerEvent::Undone { .. } => "undone",
            ServerEvent::Redone { .. } => "redone",
            ServerEvent::Cleared { .. } => "cleared",
            ServerEvent::MemberJoined { .. } => "member_joined",
            ServerEvent::MemberLeft { .. } => "member_left",
            ServerEvent::CursorMoved { .. } => "cursor_moved",
            ServerEvent::SessionSaved { .. } => "session_saved",
            ServerEvent::Notification { .. } => "notification",
        }
    }
}

#[cfg(test)]
#[path = "protocol_test.rs"]
mod tests;
