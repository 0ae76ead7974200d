//! Sketchroom — real-time room synchronization for collaborative drawing.
//!
//! SYSTEM CONTEXT
//! ==============
//! Clients connect over one websocket, join a named room, and stream
//! strokes and cursor moves. Each room keeps the canonical canvas plus a
//! bounded undo/redo log, and echoes every committed change to all of its
//! members in one total order. Saved sessions go to Postgres when
//! `DATABASE_URL` is set and to memory otherwise.

pub mod config;
pub mod db;
pub mod model;
pub mod protocol;
pub mod routes;
pub mod services;
pub mod state;
pub mod view;
