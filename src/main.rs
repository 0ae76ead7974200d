use std::sync::Arc;

use sketchroom::config::EngineConfig;
use sketchroom::services::cursor::spawn_cursor_sweeper;
use sketchroom::services::store::{MemoryStore, PgStore, SessionStore};
use sketchroom::state::AppState;
use sketchroom::{db, routes};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("database init failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("listener failed: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = dotenv {
        tracing::debug!(error = %e, "no .env loaded");
    }

    let config = EngineConfig::from_env();
    let port = config.port;

    // Postgres is optional: without DATABASE_URL saved sessions live in memory.
    let store: Arc<dyn SessionStore> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url).await?;
            tracing::info!("session store: postgres");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set — saved sessions are kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(config, store);
    let _sweeper = spawn_cursor_sweeper(state.clone());

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!(%port, "sketchroom listening");
    axum::serve(listener, app).await?;
    Ok(())
}
