//! Room — the serialization boundary for one collaborative canvas.
//!
//! DESIGN
//! ======
//! A `Room` exclusively owns canonical strokes, active strokes, the operation
//! history, members, and cursors. Nothing outside reaches into those
//! collections: callers go through the operation methods or take a
//! `RoomSnapshot`. The room does no I/O and never awaits, so it can sit
//! behind any single-writer discipline; the registry wraps each one in its
//! own async mutex.
//!
//! `apply` is the typed entry point for every in-room mutation. It returns
//! the events to fan out, already in admission order, or an error with the
//! room left untouched. Every method is all-or-nothing.
//!
//! ORDERING
//! ========
//! Canonical stroke order is the order `finish` calls are admitted here
//! (last-write-wins by admission). Commit timestamps come from a per-room
//! clock that never runs backwards, so timestamp order matches log order.

use std::collections::{HashMap, HashSet};

use rand::Rng;
use tracing::{debug, info};

use crate::model::{
    ActiveStroke, Change, Cursor, Geometry, Member, MemberId, Operation, Point, RoomId, RoomSnapshot,
    SavedSession, Stroke, StrokeId, ToolSettings,
};
use crate::protocol::{ErrorCode, NotificationLevel, ServerEvent};
use crate::services::assembler::{StrokeAssembler, validate_stroke_id};
use crate::services::history::{History, UndoFlags};

/// Member colors, handed out unused-first.
pub const PALETTE: [&str; 12] = [
    "#E53935", "#1E88E5", "#43A047", "#FB8C00", "#8E24AA", "#00ACC1", "#F4511E", "#3949AB", "#7CB342",
    "#D81B60", "#6D4C41", "#546E7A",
];

pub const MAX_DISPLAY_NAME_CHARS: usize = 32;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoomError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("stroke not found: {0}")]
    StrokeNotFound(StrokeId),
    #[error("member not found: {0}")]
    MemberNotFound(MemberId),
    #[error("room not found: {0}")]
    RoomNotFound(RoomId),
    #[error("join a room first")]
    NotJoined,
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error("room is full (max {limit} members)")]
    RoomFull { limit: usize },
}

/// Error taxonomy: how an error is surfaced and whether it is retryable by
/// the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Capacity,
}

impl RoomError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation { field, reason: reason.into() }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::NotJoined => ErrorKind::Validation,
            Self::StrokeNotFound(_)
            | Self::MemberNotFound(_)
            | Self::RoomNotFound(_)
            | Self::NothingToUndo
            | Self::NothingToRedo => ErrorKind::NotFound,
            Self::RoomFull { .. } => ErrorKind::Capacity,
        }
    }
}

impl ErrorCode for RoomError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "E_VALIDATION",
            Self::StrokeNotFound(_) => "E_STROKE_NOT_FOUND",
            Self::MemberNotFound(_) => "E_MEMBER_NOT_FOUND",
            Self::RoomNotFound(_) => "E_ROOM_NOT_FOUND",
            Self::NotJoined => "E_NOT_JOINED",
            Self::NothingToUndo => "E_NOTHING_TO_UNDO",
            Self::NothingToRedo => "E_NOTHING_TO_REDO",
            Self::RoomFull { .. } => "E_ROOM_FULL",
        }
    }

    fn level(&self) -> NotificationLevel {
        match self.kind() {
            ErrorKind::NotFound => NotificationLevel::Warning,
            ErrorKind::Validation | ErrorKind::Capacity => NotificationLevel::Error,
        }
    }
}

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomLimits {
    pub max_members: usize,
    pub operation_log_cap: usize,
    pub max_stroke_points: usize,
}

/// In-room mutation requested by an admitted member.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StrokeStart { stroke_id: Option<StrokeId>, point: Point, settings: ToolSettings },
    StrokeUpdate { stroke_id: StrokeId, points: Vec<Point> },
    StrokeEnd { stroke_id: StrokeId, geometry: Option<Geometry> },
    StrokeErase { stroke_id: StrokeId },
    CursorMove { x: f64, y: f64, drawing: bool },
    Undo,
    Redo,
    Clear,
    Resync,
    LoadSession { session: SavedSession },
}

/// Addressing of an event produced by `apply`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Every subscriber of the room, the acting member included.
    All(ServerEvent),
    /// A single member's channel.
    To(MemberId, ServerEvent),
}

/// Result of removing a member.
#[derive(Debug, Clone, PartialEq)]
pub struct Departure {
    pub member: Member,
    /// Active strokes the member abandoned.
    pub discarded: Vec<StrokeId>,
}

// =============================================================================
// ROOM
// =============================================================================

#[derive(Debug)]
pub struct Room {
    id: RoomId,
    strokes: Vec<Stroke>,
    assembler: StrokeAssembler,
    history: History,
    members: Vec<Member>,
    cursors: HashMap<MemberId, Cursor>,
    limits: RoomLimits,
    clock: i64,
    closed: bool,
}

impl Room {
    #[must_use]
    pub fn new(id: RoomId, limits: RoomLimits, now: i64) -> Self {
        Self {
            id,
            strokes: Vec::new(),
            assembler: StrokeAssembler::new(limits.max_stroke_points),
            history: History::new(limits.operation_log_cap),
            members: Vec::new(),
            cursors: HashMap::new(),
            limits,
            clock: now,
            closed: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    #[must_use]
    pub fn member(&self, member_id: MemberId) -> Option<&Member> {
        self.members.iter().find(|m| m.id == member_id)
    }

    #[must_use]
    pub fn cursor(&self, member_id: MemberId) -> Option<&Cursor> {
        self.cursors.get(&member_id)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.assembler.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// A closed room has lost its last member and must not admit anyone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    #[must_use]
    pub fn flags(&self) -> UndoFlags {
        self.history.flags()
    }

    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[must_use]
    pub fn snapshot(&self) -> RoomSnapshot {
        let mut cursors: Vec<Cursor> = self.cursors.values().cloned().collect();
        cursors.sort_by_key(|c| c.member_id);
        let flags = self.history.flags();
        RoomSnapshot {
            room_id: self.id.clone(),
            strokes: self.strokes.clone(),
            active_strokes: self.assembler.snapshot(),
            members: self.members.clone(),
            cursors,
            operations: self.history.summary(),
            can_undo: flags.can_undo,
            can_redo: flags.can_redo,
        }
    }

    // -------------------------------------------------------------------------
    // membership
    // -------------------------------------------------------------------------

    /// Admit a new member.
    ///
    /// # Errors
    ///
    /// `RoomFull` at the member cap, `Validation` for a bad display name.
    /// Nothing is created on error.
    pub fn admit(&mut self, display_name: &str, now: i64) -> Result<Member, RoomError> {
        let display_name = validate_display_name(display_name)?;
        if self.members.len() >= self.limits.max_members {
            return Err(RoomError::RoomFull { limit: self.limits.max_members });
        }

        let member = Member {
            id: uuid::Uuid::new_v4(),
            display_name,
            color: self.pick_color(),
            joined_at: self.stamp(now),
        };
        self.members.push(member.clone());
        info!(room_id = %self.id, member_id = %member.id, members = self.members.len(), "member admitted");
        Ok(member)
    }

    /// Remove a member, its cursor, and its in-progress strokes.
    pub fn remove_member(&mut self, member_id: MemberId) -> Option<Departure> {
        let index = self.members.iter().position(|m| m.id == member_id)?;
        let member = self.members.remove(index);
        self.cursors.remove(&member_id);
        let discarded = self.assembler.discard_author(member_id);
        info!(
            room_id = %self.id,
            %member_id,
            discarded = discarded.len(),
            remaining = self.members.len(),
            "member removed"
        );
        Some(Departure { member, discarded })
    }

    // -------------------------------------------------------------------------
    // strokes
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// `Validation` for bad settings or a stroke id already used in this
    /// room's canonical strokes or history.
    pub fn begin_stroke(
        &mut self,
        author_id: MemberId,
        stroke_id: Option<StrokeId>,
        settings: &ToolSettings,
        point: Point,
        now: i64,
    ) -> Result<ActiveStroke, RoomError> {
        self.require_member(author_id)?;
        if let Some(id) = &stroke_id {
            validate_stroke_id(id)?;
            if self.stroke_id_taken(id) {
                return Err(RoomError::invalid("stroke_id", format!("stroke {id} already exists")));
            }
        }
        let started_at = self.stamp(now);
        self.assembler
            .begin(author_id, stroke_id, settings, point, started_at)
    }

    /// # Errors
    ///
    /// `Validation` for malformed points. Unknown stroke ids are a no-op
    /// (`Ok(false)`).
    pub fn append_points(&mut self, author_id: MemberId, stroke_id: &str, points: &[Point]) -> Result<bool, RoomError> {
        self.require_member(author_id)?;
        self.assembler.append_points(author_id, stroke_id, points)
    }

    /// Commit an active stroke, appending an `add` operation.
    ///
    /// # Errors
    ///
    /// `StrokeNotFound` if the stroke is not active for this author.
    pub fn finish_stroke(
        &mut self,
        author_id: MemberId,
        stroke_id: &str,
        geometry: Option<Geometry>,
        now: i64,
    ) -> Result<(Stroke, Operation), RoomError> {
        let author = self.require_member(author_id)?.clone();
        let committed_at = self.clock.max(now);
        let stroke = self
            .assembler
            .finish(author_id, stroke_id, geometry, committed_at)?;
        self.clock = committed_at;

        self.strokes.push(stroke.clone());
        let op = Operation::new(Change::Add { stroke: stroke.clone() }, &author, committed_at);
        self.history.record(op.clone());
        debug!(room_id = %self.id, %stroke_id, strokes = self.strokes.len(), "stroke committed");
        Ok((stroke, op))
    }

    /// Remove one committed stroke, appending a `remove` operation.
    ///
    /// # Errors
    ///
    /// `StrokeNotFound` if the stroke is not canonical.
    pub fn erase_stroke(&mut self, author_id: MemberId, stroke_id: &str, now: i64) -> Result<Operation, RoomError> {
        let author = self.require_member(author_id)?.clone();
        let index = self
            .strokes
            .iter()
            .position(|s| s.id == stroke_id)
            .ok_or_else(|| RoomError::StrokeNotFound(stroke_id.to_string()))?;

        let stroke = self.strokes.remove(index);
        let op = Operation::new(Change::Remove { stroke, index }, &author, self.stamp(now));
        self.history.record(op.clone());
        Ok(op)
    }

    // -------------------------------------------------------------------------
    // history
    // -------------------------------------------------------------------------

    /// Global undo: any member may undo any member's operation.
    ///
    /// # Errors
    ///
    /// `NothingToUndo` when the retained log is empty.
    pub fn undo(&mut self, member_id: MemberId) -> Result<Operation, RoomError> {
        self.require_member(member_id)?;
        self.history.undo(&mut self.strokes)
    }

    /// # Errors
    ///
    /// `NothingToRedo` when the redo stack is empty.
    pub fn redo(&mut self, member_id: MemberId) -> Result<Operation, RoomError> {
        self.require_member(member_id)?;
        self.history.redo(&mut self.strokes)
    }

    /// Empty the canvas (canonical and active strokes), appending a `clear`
    /// operation that carries the pre-clear list.
    ///
    /// # Errors
    ///
    /// `MemberNotFound` for a caller that is not a member.
    pub fn clear(&mut self, member_id: MemberId, now: i64) -> Result<Operation, RoomError> {
        let author = self.require_member(member_id)?.clone();
        let snapshot = std::mem::take(&mut self.strokes);
        let dropped = self.assembler.clear();
        let op = Operation::new(Change::Clear { strokes: snapshot }, &author, self.stamp(now));
        self.history.record(op.clone());
        info!(room_id = %self.id, %member_id, dropped_active = dropped, "canvas cleared");
        Ok(op)
    }

    // -------------------------------------------------------------------------
    // cursors
    // -------------------------------------------------------------------------

    /// Upsert a member's cursor. Latest write wins.
    ///
    /// # Errors
    ///
    /// `Validation` for non-finite coordinates.
    pub fn update_cursor(
        &mut self,
        member_id: MemberId,
        x: f64,
        y: f64,
        drawing: bool,
        now: i64,
    ) -> Result<Cursor, RoomError> {
        self.require_member(member_id)?;
        if !x.is_finite() || !y.is_finite() {
            return Err(RoomError::invalid("cursor", "coordinates must be finite"));
        }
        let cursor = Cursor { member_id, x, y, drawing, updated_at: now };
        self.cursors.insert(member_id, cursor.clone());
        Ok(cursor)
    }

    /// Drop cursors idle for longer than `idle_ms`. Returns how many.
    pub fn sweep_cursors(&mut self, now: i64, idle_ms: i64) -> usize {
        let before = self.cursors.len();
        self.cursors
            .retain(|_, cursor| now.saturating_sub(cursor.updated_at) <= idle_ms);
        before - self.cursors.len()
    }

    // -------------------------------------------------------------------------
    // sessions
    // -------------------------------------------------------------------------

    /// Export canonical strokes and the retained log.
    ///
    /// # Errors
    ///
    /// `MemberNotFound` for a caller that is not a member.
    pub fn export(&self, member_id: MemberId, now: i64) -> Result<SavedSession, RoomError> {
        let member = self.require_member(member_id)?;
        Ok(SavedSession {
            id: uuid::Uuid::new_v4(),
            room_id: self.id.clone(),
            strokes: self.strokes.clone(),
            operations: self.history.operations(),
            saved_at: now,
            saved_by: member.display_name.clone(),
        })
    }

    /// Replace canonical state wholesale with a saved session. Active
    /// strokes are dropped and the redo stack is reset.
    ///
    /// # Errors
    ///
    /// `Validation` for duplicate or malformed strokes in the session, or
    /// for a log that does not undo cleanly back from its strokes.
    pub fn load(&mut self, member_id: MemberId, session: SavedSession, now: i64) -> Result<(), RoomError> {
        self.require_member(member_id)?;
        validate_session(&session, self.limits.max_stroke_points)?;

        self.strokes = session.strokes;
        self.history.replace(session.operations);
        self.assembler.clear();
        let newest = self
            .history
            .operations()
            .last()
            .map_or(0, |op| op.committed_at);
        self.clock = self.clock.max(newest).max(now);
        info!(
            room_id = %self.id,
            session_id = %session.id,
            strokes = self.strokes.len(),
            operations = self.history.len(),
            "session loaded"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // dispatch
    // -------------------------------------------------------------------------

    /// Apply one command atomically and return the events to deliver.
    ///
    /// # Errors
    ///
    /// Any error of the underlying operation; the room is unchanged.
    pub fn apply(&mut self, member_id: MemberId, command: Command, now: i64) -> Result<Vec<Outbound>, RoomError> {
        self.require_member(member_id)?;

        let events = match command {
            Command::StrokeStart { stroke_id, point, settings } => {
                let stroke = self.begin_stroke(member_id, stroke_id, &settings, point, now)?;
                vec![Outbound::All(ServerEvent::StrokeStarted { stroke })]
            }
            Command::StrokeUpdate { stroke_id, points } => {
                if self.append_points(member_id, &stroke_id, &points)? {
                    vec![Outbound::All(ServerEvent::StrokeUpdated { stroke_id, points })]
                } else {
                    Vec::new()
                }
            }
            Command::StrokeEnd { stroke_id, geometry } => {
                let (stroke, operation) = self.finish_stroke(member_id, &stroke_id, geometry, now)?;
                let flags = self.flags();
                vec![Outbound::All(ServerEvent::StrokeEnded {
                    stroke,
                    operation,
                    can_undo: flags.can_undo,
                    can_redo: flags.can_redo,
                })]
            }
            Command::StrokeErase { stroke_id } => {
                let operation = self.erase_stroke(member_id, &stroke_id, now)?;
                let flags = self.flags();
                vec![Outbound::All(ServerEvent::StrokeErased {
                    stroke_id,
                    operation,
                    can_undo: flags.can_undo,
                    can_redo: flags.can_redo,
                })]
            }
            Command::CursorMove { x, y, drawing } => {
                let cursor = self.update_cursor(member_id, x, y, drawing, now)?;
                vec![Outbound::All(ServerEvent::CursorMoved { cursor })]
            }
            Command::Undo => {
                let operation = self.undo(member_id)?;
                let flags = self.flags();
                vec![Outbound::All(ServerEvent::Undone {
                    operation,
                    can_undo: flags.can_undo,
                    can_redo: flags.can_redo,
                })]
            }
            Command::Redo => {
                let operation = self.redo(member_id)?;
                let flags = self.flags();
                vec![Outbound::All(ServerEvent::Redone {
                    operation,
                    can_undo: flags.can_undo,
                    can_redo: flags.can_redo,
                })]
            }
            Command::Clear => {
                let operation = self.clear(member_id, now)?;
                let flags = self.flags();
                let notice = format!("{} cleared the canvas", operation.author_name);
                vec![
                    Outbound::All(ServerEvent::Cleared {
                        operation,
                        can_undo: flags.can_undo,
                        can_redo: flags.can_redo,
                    }),
                    Outbound::All(ServerEvent::notification(NotificationLevel::Info, notice)),
                ]
            }
            Command::Resync => vec![Outbound::To(member_id, ServerEvent::SyncState(self.snapshot()))],
            Command::LoadSession { session } => {
                self.load(member_id, session, now)?;
                let notice = match self.member(member_id) {
                    Some(member) => format!("{} loaded a saved session", member.display_name),
                    None => "a saved session was loaded".to_string(),
                };
                vec![
                    Outbound::All(ServerEvent::SyncState(self.snapshot())),
                    Outbound::All(ServerEvent::notification(NotificationLevel::Info, notice)),
                ]
            }
        };
        Ok(events)
    }

    // -------------------------------------------------------------------------
    // helpers
    // -------------------------------------------------------------------------

    fn require_member(&self, member_id: MemberId) -> Result<&Member, RoomError> {
        self.member(member_id)
            .ok_or(RoomError::MemberNotFound(member_id))
    }

    /// Next non-decreasing room timestamp.
    fn stamp(&mut self, now: i64) -> i64 {
        self.clock = self.clock.max(now);
        self.clock
    }

    fn stroke_id_taken(&self, stroke_id: &str) -> bool {
        self.assembler.contains(stroke_id)
            || self.strokes.iter().any(|s| s.id == stroke_id)
            || self.history.mentions(stroke_id)
    }

    /// First palette color no current member wears; a random reuse once
    /// every color is taken.
    fn pick_color(&self) -> String {
        let free = PALETTE
            .iter()
            .find(|color| !self.members.iter().any(|m| m.color == **color));
        match free {
            Some(color) => (*color).to_string(),
            None => PALETTE[rand::rng().random_range(0..PALETTE.len())].to_string(),
        }
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn validate_display_name(raw: &str) -> Result<String, RoomError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(RoomError::invalid("display_name", "must not be empty"));
    }
    if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(RoomError::invalid(
            "display_name",
            format!("longer than {MAX_DISPLAY_NAME_CHARS} characters"),
        ));
    }
    Ok(name.to_string())
}

/// Room ids are 1..=64 chars of `[A-Za-z0-9_-]`.
pub(crate) fn validate_room_id(room_id: &str) -> Result<(), RoomError> {
    if room_id.is_empty() || room_id.len() > 64 {
        return Err(RoomError::invalid("room_id", "must be 1 to 64 characters"));
    }
    if !room_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(RoomError::invalid("room_id", "only letters, digits, '-' and '_' are allowed"));
    }
    Ok(())
}

/// A loaded session must describe a canvas the room could have reached
/// itself: unique well-formed strokes, and a log that undoes cleanly back
/// from them.
fn validate_session(session: &SavedSession, max_points: usize) -> Result<(), RoomError> {
    let mut seen = HashSet::new();
    for stroke in &session.strokes {
        validate_saved_stroke(stroke, max_points)?;
        if !seen.insert(stroke.id.as_str()) {
            return Err(RoomError::invalid("session", format!("duplicate stroke id {}", stroke.id)));
        }
    }
    validate_log(&session.strokes, &session.operations, max_points)
}

fn validate_saved_stroke(stroke: &Stroke, max_points: usize) -> Result<(), RoomError> {
    validate_stroke_id(&stroke.id)?;
    if !stroke.geometry.fits(stroke.tool) || !stroke.geometry.is_finite() {
        return Err(RoomError::invalid("session", format!("stroke {} has malformed geometry", stroke.id)));
    }
    if stroke.geometry.point_count() > max_points {
        return Err(RoomError::invalid("session", format!("stroke {} exceeds {max_points} points", stroke.id)));
    }
    Ok(())
}

/// Walk the log newest-first from the saved canvas, tracking which ids are
/// on it. Each step must find the canvas its inverse expects.
fn validate_log(strokes: &[Stroke], operations: &[Operation], max_points: usize) -> Result<(), RoomError> {
    let mut canvas: HashSet<&str> = strokes.iter().map(|s| s.id.as_str()).collect();
    for op in operations.iter().rev() {
        match &op.change {
            Change::Add { stroke } => {
                validate_saved_stroke(stroke, max_points)?;
                if !canvas.remove(stroke.id.as_str()) {
                    return Err(RoomError::invalid(
                        "session",
                        format!("operation {} adds stroke {} that is not on the canvas", op.id, stroke.id),
                    ));
                }
            }
            Change::Remove { stroke, .. } => {
                validate_saved_stroke(stroke, max_points)?;
                if !canvas.insert(stroke.id.as_str()) {
                    return Err(RoomError::invalid(
                        "session",
                        format!("operation {} removes stroke {} that is still on the canvas", op.id, stroke.id),
                    ));
                }
            }
            Change::Clear { strokes } => {
                if !canvas.is_empty() {
                    return Err(RoomError::invalid(
                        "session",
                        format!("operation {} clears but later strokes are never added by the log", op.id),
                    ));
                }
                for stroke in strokes {
                    validate_saved_stroke(stroke, max_points)?;
                    if !canvas.insert(stroke.id.as_str()) {
                        return Err(RoomError::invalid(
                            "session",
                            format!("operation {} restores duplicate stroke id {}", op.id, stroke.id),
                        ));
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
