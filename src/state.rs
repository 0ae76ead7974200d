//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the engine config, the room registry, the transport session
//! table, and the saved-session store. Live drawing state sits inside the
//! registry's rooms, never directly in this struct.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::services::registry::RoomRegistry;
use crate::services::session::SessionManager;
use crate::services::store::SessionStore;

/// Clone is required by Axum; every field is Arc-backed.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<EngineConfig>,
    pub rooms: RoomRegistry,
    pub sessions: SessionManager,
    pub store: Arc<dyn SessionStore>,
}

impl AppState {
    #[must_use]
    pub fn new(config: EngineConfig, store: Arc<dyn SessionStore>) -> Self {
        let rooms = RoomRegistry::new(config.room_limits());
        let sessions = SessionManager::new(config.session_queue_capacity);
        Self { config: Arc::new(config), rooms, sessions, store }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
