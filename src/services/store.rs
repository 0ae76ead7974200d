//! Session store — saved room exports for `save_session` / `load_session`.
//!
//! DESIGN
//! ======
//! The room engine never touches storage. The websocket layer exports a
//! room, hands the `SavedSession` to a `SessionStore`, and tells the caller
//! the id. Loading goes the other way through `load_session`, which carries
//! the whole export inline, so the store is only needed to keep and list
//! saved exports between connections.
//!
//! `MemoryStore` is the default. `PgStore` keeps each export as one JSONB
//! row and is selected when a database is configured.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::SavedSession;
use crate::protocol::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("saved session not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed saved session: {0}")]
    Serde(#[from] serde_json::Error),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_SESSION_NOT_FOUND",
            Self::Database(_) => "E_DATABASE",
            Self::Serde(_) => "E_SESSION_MALFORMED",
        }
    }
}

/// Listing entry; the full export is fetched with `load`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub id: Uuid,
    pub room_id: String,
    pub saved_at: i64,
    pub saved_by: String,
    pub stroke_count: usize,
    pub operation_count: usize,
}

impl From<&SavedSession> for SessionSummary {
    fn from(session: &SavedSession) -> Self {
        Self {
            id: session.id,
            room_id: session.room_id.clone(),
            saved_at: session.saved_at,
            saved_by: session.saved_by.clone(),
            stroke_count: session.strokes.len(),
            operation_count: session.operations.len(),
        }
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: &SavedSession) -> Result<(), StoreError>;

    async fn load(&self, id: Uuid) -> Result<SavedSession, StoreError>;

    /// Saved exports of one room, newest first.
    async fn list(&self, room_id: &str) -> Result<Vec<SessionSummary>, StoreError>;
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    sessions: Arc<RwLock<HashMap<Uuid, SavedSession>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn save(&self, session: &SavedSession) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<SavedSession, StoreError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, room_id: &str) -> Result<Vec<SessionSummary>, StoreError> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<SessionSummary> = sessions
            .values()
            .filter(|s| s.room_id == room_id)
            .map(SessionSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn save(&self, session: &SavedSession) -> Result<(), StoreError> {
        let body = serde_json::to_value(session)?;
        sqlx::query(
            "INSERT INTO saved_sessions (id, room_id, saved_at, saved_by, body) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.id)
        .bind(&session.room_id)
        .bind(session.saved_at)
        .bind(&session.saved_by)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<SavedSession, StoreError> {
        let row = sqlx::query_as::<_, (serde_json::Value,)>("SELECT body FROM saved_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some((body,)) = row else {
            return Err(StoreError::NotFound(id));
        };
        Ok(serde_json::from_value(body)?)
    }

    async fn list(&self, room_id: &str) -> Result<Vec<SessionSummary>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid, String, i64, String, i32, i32)>(
            "SELECT id, room_id, saved_at, saved_by, \
                    jsonb_array_length(body->'strokes'), jsonb_array_length(body->'operations') \
             FROM saved_sessions WHERE room_id = $1 ORDER BY saved_at DESC, id",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, room_id, saved_at, saved_by, strokes, operations)| SessionSummary {
                id,
                room_id,
                saved_at,
                saved_by,
                stroke_count: usize::try_from(strokes).unwrap_or(0),
                operation_count: usize::try_from(operations).unwrap_or(0),
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
