//! Drawing data model — points, strokes, operations, members, cursors.
//!
//! DESIGN
//! ======
//! Plain value records shared by the room engine, the wire protocol, and the
//! `CanvasView` reducer. The only behavior that lives here is the forward and
//! inverse effect of an `Operation` on a canonical stroke list, so the server
//! and every client replay history through the same two functions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Server-assigned member identifier (one per admitted session).
pub type MemberId = Uuid;

/// Client-proposed stroke identifier, unique within a room.
pub type StrokeId = String;

/// Room identifier as supplied on `join`.
pub type RoomId = String;

// =============================================================================
// GEOMETRY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, pressure: None }
    }

    #[must_use]
    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }

    /// Coordinates, and pressure when present, are finite numbers.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.pressure.is_none_or(f64::is_finite)
    }
}

/// Drawing tool. Freehand tools accumulate points; shape tools keep a
/// start/end pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Pen,
    Marker,
    Highlighter,
    Line,
    Rectangle,
    Ellipse,
    Arrow,
}

impl Tool {
    #[must_use]
    pub fn is_shape(self) -> bool {
        matches!(self, Tool::Line | Tool::Rectangle | Tool::Ellipse | Tool::Arrow)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    Freehand { points: Vec<Point> },
    Shape { start: Point, end: Point },
}

impl Geometry {
    /// Initial geometry for a stroke that begins at `point`.
    #[must_use]
    pub fn starting_at(tool: Tool, point: Point) -> Self {
        if tool.is_shape() {
            Geometry::Shape { start: point, end: point }
        } else {
            Geometry::Freehand { points: vec![point] }
        }
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        match self {
            Geometry::Freehand { points } => points.iter().all(Point::is_finite),
            Geometry::Shape { start, end } => start.is_finite() && end.is_finite(),
        }
    }

    /// Whether this geometry variant is the one `tool` produces.
    #[must_use]
    pub fn fits(&self, tool: Tool) -> bool {
        matches!(self, Geometry::Shape { .. }) == tool.is_shape()
    }

    #[must_use]
    pub fn point_count(&self) -> usize {
        match self {
            Geometry::Freehand { points } => points.len(),
            Geometry::Shape { .. } => 2,
        }
    }
}

// =============================================================================
// STROKES
// =============================================================================

/// Style chosen by the author when a stroke begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSettings {
    pub tool: Tool,
    pub color: String,
    pub width: f64,
    #[serde(default)]
    pub filled: bool,
}

/// A stroke still being drawn. Owned by its room until `finish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveStroke {
    pub id: StrokeId,
    pub author_id: MemberId,
    pub tool: Tool,
    pub geometry: Geometry,
    pub color: String,
    pub width: f64,
    pub filled: bool,
    pub started_at: i64,
}

impl ActiveStroke {
    /// Promote to an immutable canonical stroke.
    #[must_use]
    pub fn commit(self, committed_at: i64) -> Stroke {
        Stroke {
            id: self.id,
            author_id: self.author_id,
            tool: self.tool,
            geometry: self.geometry,
            color: self.color,
            width: self.width,
            filled: self.filled,
            committed_at,
        }
    }
}

/// A committed stroke. Never mutated once canonical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub id: StrokeId,
    pub author_id: MemberId,
    pub tool: Tool,
    pub geometry: Geometry,
    pub color: String,
    pub width: f64,
    pub filled: bool,
    pub committed_at: i64,
}

// =============================================================================
// OPERATIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Add,
    Remove,
    Clear,
}

/// Payload of an operation: everything needed to apply or invert it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Change {
    Add { stroke: Stroke },
    /// `index` is the position the stroke occupied before removal.
    Remove { stroke: Stroke, index: usize },
    Clear { strokes: Vec<Stroke> },
}

impl Change {
    #[must_use]
    pub fn kind(&self) -> OperationKind {
        match self {
            Change::Add { .. } => OperationKind::Add,
            Change::Remove { .. } => OperationKind::Remove,
            Change::Clear { .. } => OperationKind::Clear,
        }
    }

    /// True if this change carries a stroke with the given id.
    #[must_use]
    pub fn mentions(&self, stroke_id: &str) -> bool {
        match self {
            Change::Add { stroke } | Change::Remove { stroke, .. } => stroke.id == stroke_id,
            Change::Clear { strokes } => strokes.iter().any(|s| s.id == stroke_id),
        }
    }
}

/// An invertible record of one committed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    #[serde(flatten)]
    pub change: Change,
    pub author_id: MemberId,
    pub author_name: String,
    pub committed_at: i64,
}

impl Operation {
    #[must_use]
    pub fn new(change: Change, author: &Member, committed_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            change,
            author_id: author.id,
            author_name: author.display_name.clone(),
            committed_at,
        }
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.change.kind()
    }

    /// Apply the forward effect to a canonical stroke list.
    pub fn apply(&self, strokes: &mut Vec<Stroke>) {
        match &self.change {
            Change::Add { stroke } => strokes.push(stroke.clone()),
            Change::Remove { stroke, .. } => strokes.retain(|s| s.id != stroke.id),
            Change::Clear { .. } => strokes.clear(),
        }
    }

    /// Apply the inverse effect. `revert` after `apply` restores the list
    /// exactly, ids and order included.
    pub fn revert(&self, strokes: &mut Vec<Stroke>) {
        match &self.change {
            Change::Add { stroke } => strokes.retain(|s| s.id != stroke.id),
            Change::Remove { stroke, index } => {
                let at = (*index).min(strokes.len());
                strokes.insert(at, stroke.clone());
            }
            Change::Clear { strokes: snapshot } => strokes.clone_from(snapshot),
        }
    }
}

/// Lightweight view of a log entry, carried in `sync_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub id: Uuid,
    pub kind: OperationKind,
    pub author_id: MemberId,
    pub author_name: String,
    pub committed_at: i64,
}

impl From<&Operation> for OperationSummary {
    fn from(op: &Operation) -> Self {
        Self {
            id: op.id,
            kind: op.kind(),
            author_id: op.author_id,
            author_name: op.author_name.clone(),
            committed_at: op.committed_at,
        }
    }
}

// =============================================================================
// PRESENCE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub display_name: String,
    pub color: String,
    pub joined_at: i64,
}

/// Ephemeral pointer position. Never logged, never undone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub member_id: MemberId,
    pub x: f64,
    pub y: f64,
    pub drawing: bool,
    pub updated_at: i64,
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Full room state pushed to a newly admitted or resyncing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub strokes: Vec<Stroke>,
    pub active_strokes: Vec<ActiveStroke>,
    pub members: Vec<Member>,
    pub cursors: Vec<Cursor>,
    pub operations: Vec<OperationSummary>,
    pub can_undo: bool,
    pub can_redo: bool,
}

/// Export layout for `save_session` / `load_session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSession {
    pub id: Uuid,
    pub room_id: RoomId,
    pub strokes: Vec<Stroke>,
    pub operations: Vec<Operation>,
    pub saved_at: i64,
    pub saved_by: String,
}

#[cfg(test)]
#[path = "model_test.rs"]
mod tests;
