//! Room engine services used by the websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! `room` owns per-room state and is built from `assembler` and `history`.
//! `registry` maps room ids to live rooms and fans out through `broadcast`.
//! Route handlers stay focused on protocol translation.

pub mod assembler;
pub mod broadcast;
pub mod cursor;
pub mod history;
pub mod registry;
pub mod room;
pub mod session;
pub mod store;
