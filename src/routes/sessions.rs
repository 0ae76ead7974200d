//! Saved-session and stats routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::model::SavedSession;
use crate::services::registry::RegistryStats;
use crate::services::store::{SessionSummary, StoreError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub rooms: RegistryStats,
    pub sessions: usize,
    pub bound_sessions: usize,
}

/// `GET /api/rooms/{room_id}/sessions` — saved exports of one room.
pub async fn list_sessions(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<SessionSummary>>, StatusCode> {
    let sessions = state
        .store
        .list(&room_id)
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(sessions))
}

/// `GET /api/sessions/{id}` — one saved export, ready for `load_session`.
pub async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<SavedSession>, StatusCode> {
    let session = state
        .store
        .load(id)
        .await
        .map_err(store_error_to_status)?;
    Ok(Json(session))
}

/// `GET /api/stats` — live room and session counts.
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        rooms: state.rooms.stats().await,
        sessions: state.sessions.count().await,
        bound_sessions: state.sessions.bound_count().await,
    })
}

pub(crate) fn store_error_to_status(err: StoreError) -> StatusCode {
    match err {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Database(e) => {
            error!(error = %e, "session store database error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        StoreError::Serde(e) => {
            error!(error = %e, "stored session failed to decode");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
#[path = "sessions_test.rs"]
mod tests;
