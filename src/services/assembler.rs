//! Stroke assembler — start/update/end messages into committed strokes.
//!
//! DESIGN
//! ======
//! Holds the in-progress strokes of one room, keyed by stroke id. Each
//! stroke moves `absent → active → committed` exactly once: `finish` removes
//! the active entry in the same call that produces the immutable `Stroke`, so
//! no id is ever both active and committed.
//!
//! Trailing `stroke_update` batches race with `stroke_end` on a lossy
//! transport. A batch for an unknown id (already finished, cleared, or never
//! started) is dropped without error.

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use crate::model::{ActiveStroke, Geometry, MemberId, Point, Stroke, StrokeId, ToolSettings};
use crate::services::room::RoomError;

pub const MIN_WIDTH: f64 = 1.0;
pub const MAX_WIDTH: f64 = 100.0;
pub const MAX_STROKE_ID_LEN: usize = 64;
pub const MAX_COLOR_LEN: usize = 32;

#[derive(Debug)]
pub struct StrokeAssembler {
    active: HashMap<StrokeId, ActiveStroke>,
    max_points: usize,
}

impl StrokeAssembler {
    #[must_use]
    pub fn new(max_points: usize) -> Self {
        Self { active: HashMap::new(), max_points }
    }

    /// Start a new active stroke and return a copy of it.
    ///
    /// # Errors
    ///
    /// `Validation` for a non-finite width or point, a bad color, or an id
    /// that is malformed or already active. Width is clamped, not rejected.
    pub fn begin(
        &mut self,
        author_id: MemberId,
        stroke_id: Option<StrokeId>,
        settings: &ToolSettings,
        point: Point,
        started_at: i64,
    ) -> Result<ActiveStroke, RoomError> {
        let width = validate_width(settings.width)?;
        validate_color(&settings.color)?;
        if !point.is_finite() {
            return Err(RoomError::invalid("point", "coordinates must be finite"));
        }

        let id = match stroke_id {
            Some(id) => {
                validate_stroke_id(&id)?;
                id
            }
            None => Uuid::new_v4().to_string(),
        };
        if self.active.contains_key(&id) {
            return Err(RoomError::invalid("stroke_id", format!("stroke {id} is already in progress")));
        }

        let stroke = ActiveStroke {
            id: id.clone(),
            author_id,
            tool: settings.tool,
            geometry: Geometry::starting_at(settings.tool, point),
            color: settings.color.clone(),
            width,
            filled: settings.filled,
            started_at,
        };
        self.active.insert(id, stroke.clone());
        Ok(stroke)
    }

    /// Append a batch to an active stroke. Returns `false` when the batch
    /// was dropped as a stale race (unknown id, foreign author, empty batch).
    ///
    /// Freehand strokes extend their point buffer; shape strokes move their
    /// end point to the last point of the batch.
    ///
    /// # Errors
    ///
    /// `Validation` for non-finite points or a freehand buffer that would
    /// exceed the per-stroke cap. Nothing is appended on error.
    pub fn append_points(&mut self, author_id: MemberId, stroke_id: &str, points: &[Point]) -> Result<bool, RoomError> {
        if !points.iter().all(Point::is_finite) {
            return Err(RoomError::invalid("points", "coordinates must be finite"));
        }
        let Some(last) = points.last() else {
            return Ok(false);
        };
        let Some(stroke) = self.active.get_mut(stroke_id) else {
            debug!(%stroke_id, "stroke update for unknown stroke dropped");
            return Ok(false);
        };
        if stroke.author_id != author_id {
            debug!(%stroke_id, %author_id, "stroke update from non-author dropped");
            return Ok(false);
        }

        match &mut stroke.geometry {
            Geometry::Freehand { points: buffer } => {
                if buffer.len() + points.len() > self.max_points {
                    return Err(RoomError::invalid(
                        "points",
                        format!("stroke exceeds {} points", self.max_points),
                    ));
                }
                buffer.extend_from_slice(points);
            }
            Geometry::Shape { end, .. } => *end = *last,
        }
        Ok(true)
    }

    /// Promote an active stroke to a committed one. When `geometry` is
    /// given it replaces whatever was accumulated from updates.
    ///
    /// # Errors
    ///
    /// `StrokeNotFound` when no active stroke with this id belongs to
    /// `author_id`; `Validation` for geometry that is non-finite, empty, too
    /// large, or of the wrong kind for the stroke's tool.
    pub fn finish(
        &mut self,
        author_id: MemberId,
        stroke_id: &str,
        geometry: Option<Geometry>,
        committed_at: i64,
    ) -> Result<Stroke, RoomError> {
        let Some(stroke) = self.active.get(stroke_id) else {
            return Err(RoomError::StrokeNotFound(stroke_id.to_string()));
        };
        if stroke.author_id != author_id {
            return Err(RoomError::StrokeNotFound(stroke_id.to_string()));
        }
        if let Some(geometry) = &geometry {
            self.validate_geometry(stroke, geometry)?;
        }

        let Some(mut stroke) = self.active.remove(stroke_id) else {
            return Err(RoomError::StrokeNotFound(stroke_id.to_string()));
        };
        if let Some(geometry) = geometry {
            stroke.geometry = geometry;
        }
        Ok(stroke.commit(committed_at))
    }

    /// Drop every active stroke of a departing author. Returns their ids.
    pub fn discard_author(&mut self, author_id: MemberId) -> Vec<StrokeId> {
        let mut discarded: Vec<StrokeId> = self
            .active
            .values()
            .filter(|s| s.author_id == author_id)
            .map(|s| s.id.clone())
            .collect();
        discarded.sort();
        for id in &discarded {
            self.active.remove(id);
        }
        discarded
    }

    /// Drop all active strokes. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let count = self.active.len();
        self.active.clear();
        count
    }

    #[must_use]
    pub fn contains(&self, stroke_id: &str) -> bool {
        self.active.contains_key(stroke_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Active strokes in start order (ties broken by id).
    #[must_use]
    pub fn snapshot(&self) -> Vec<ActiveStroke> {
        let mut strokes: Vec<ActiveStroke> = self.active.values().cloned().collect();
        strokes.sort_by(|a, b| a.started_at.cmp(&b.started_at).then_with(|| a.id.cmp(&b.id)));
        strokes
    }

    fn validate_geometry(&self, stroke: &ActiveStroke, geometry: &Geometry) -> Result<(), RoomError> {
        if !geometry.fits(stroke.tool) {
            return Err(RoomError::invalid("geometry", "geometry kind does not match the stroke tool"));
        }
        if !geometry.is_finite() {
            return Err(RoomError::invalid("geometry", "coordinates must be finite"));
        }
        let count = geometry.point_count();
        if count == 0 {
            return Err(RoomError::invalid("geometry", "freehand geometry needs at least one point"));
        }
        if count > self.max_points {
            return Err(RoomError::invalid("geometry", format!("stroke exceeds {} points", self.max_points)));
        }
        Ok(())
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Reject non-finite widths, clamp the rest into `[MIN_WIDTH, MAX_WIDTH]`.
pub(crate) fn validate_width(width: f64) -> Result<f64, RoomError> {
    if !width.is_finite() {
        return Err(RoomError::invalid("width", "must be a finite number"));
    }
    Ok(width.clamp(MIN_WIDTH, MAX_WIDTH))
}

pub(crate) fn validate_color(color: &str) -> Result<(), RoomError> {
    if color.trim().is_empty() {
        return Err(RoomError::invalid("color", "must not be empty"));
    }
    if color.len() > MAX_COLOR_LEN {
        return Err(RoomError::invalid("color", format!("longer than {MAX_COLOR_LEN} bytes")));
    }
    Ok(())
}

pub(crate) fn validate_stroke_id(id: &str) -> Result<(), RoomError> {
    if id.trim().is_empty() {
        return Err(RoomError::invalid("stroke_id", "must not be empty"));
    }
    if id.len() > MAX_STROKE_ID_LEN {
        return Err(RoomError::invalid("stroke_id", format!("longer than {MAX_STROKE_ID_LEN} bytes")));
    }
    Ok(())
}

#[cfg(test)]
#[path = "assembler_test.rs"]
mod tests;
