//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the websocket endpoint and the small read-only HTTP
//! API under a single Axum router. All live drawing traffic goes over
//! `/api/ws`; the HTTP routes only expose saved sessions and stats.

pub mod sessions;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// The full application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/ws", get(ws::handle_ws))
        .route("/api/rooms/{room_id}/sessions", get(sessions::list_sessions))
        .route("/api/sessions/{id}", get(sessions::get_session))
        .route("/api/stats", get(sessions::stats))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
