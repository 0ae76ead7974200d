//! Operation log and undo engine — global, cross-member undo/redo.
//!
//! DESIGN
//! ======
//! The log is append-only except for pop-on-undo. The redo stack gains an
//! entry only from an undo pop and is emptied by every fresh `record`.
//! Undo and redo move one `Operation` between the two stacks and apply its
//! inverse or forward effect to the canonical stroke list.
//!
//! RETENTION
//! =========
//! The log is capped; the oldest entries are evicted first. Eviction never
//! touches canonical strokes. Once an entry is gone, undo stops at the
//! boundary with `NothingToUndo` instead of reaching past it.
//!
//! Eviction only happens inside `record`, which clears the redo stack first,
//! so a redo entry can never refer to history older than the retained log.
//! Undo/redo conserve `log + redo`, which therefore never exceeds the cap.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Operation, OperationSummary, Stroke};
use crate::services::room::RoomError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoFlags {
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug)]
pub struct History {
    log: VecDeque<Operation>,
    redo: Vec<Operation>,
    cap: usize,
    evicted: u64,
}

impl History {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self { log: VecDeque::new(), redo: Vec::new(), cap: cap.max(1), evicted: 0 }
    }

    /// Append a fresh operation. Clears the redo stack, then evicts the
    /// oldest entries beyond the cap. Returns how many were evicted.
    pub fn record(&mut self, op: Operation) -> usize {
        self.redo.clear();
        self.log.push_back(op);
        self.enforce_cap()
    }

    /// Pop the newest operation and apply its inverse to `strokes`.
    ///
    /// # Errors
    ///
    /// `NothingToUndo` when the retained log is empty.
    pub fn undo(&mut self, strokes: &mut Vec<Stroke>) -> Result<Operation, RoomError> {
        let op = self.log.pop_back().ok_or(RoomError::NothingToUndo)?;
        op.revert(strokes);
        self.redo.push(op.clone());
        Ok(op)
    }

    /// Pop the newest undone operation and re-apply its forward effect.
    ///
    /// # Errors
    ///
    /// `NothingToRedo` when the redo stack is empty.
    pub fn redo(&mut self, strokes: &mut Vec<Stroke>) -> Result<Operation, RoomError> {
        let op = self.redo.pop().ok_or(RoomError::NothingToRedo)?;
        op.apply(strokes);
        self.log.push_back(op.clone());
        self.enforce_cap();
        Ok(op)
    }

    /// Replace the whole history (session load). Keeps the newest `cap`
    /// entries and resets the redo stack.
    pub fn replace(&mut self, operations: Vec<Operation>) {
        self.redo.clear();
        self.log = operations.into();
        self.enforce_cap();
    }

    #[must_use]
    pub fn flags(&self) -> UndoFlags {
        UndoFlags { can_undo: !self.log.is_empty(), can_redo: !self.redo.is_empty() }
    }

    /// True if any retained or undone operation carries this stroke id.
    #[must_use]
    pub fn mentions(&self, stroke_id: &str) -> bool {
        self.log
            .iter()
            .chain(self.redo.iter())
            .any(|op| op.change.mentions(stroke_id))
    }

    #[must_use]
    pub fn summary(&self) -> Vec<OperationSummary> {
        self.log.iter().map(OperationSummary::from).collect()
    }

    /// Retained log entries, oldest first.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.log.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Total entries evicted over the life of this history.
    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    fn enforce_cap(&mut self) -> usize {
        let mut evicted = 0;
        while self.log.len() > self.cap {
            self.log.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            self.evicted += evicted as u64;
            debug!(evicted, retained = self.log.len(), "operation log evicted oldest entries");
        }
        evicted
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
