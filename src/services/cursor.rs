//! Cursor sweeper — periodic purge of idle cursors.
//!
//! DESIGN
//! ======
//! Cursors are ephemeral and never logged. A background task wakes on a
//! fixed interval and drops every cursor whose last update is older than
//! the idle timeout. Nobody is notified; clients age out stale cursors on
//! their own and the next `sync_state` reflects the purge.

use tokio::task::JoinHandle;
use tracing::debug;

use crate::protocol::now_ms;
use crate::state::AppState;

/// Spawn the background sweep task. Returns a handle for shutdown.
pub fn spawn_cursor_sweeper(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(state.config.cursor_sweep_interval);
        loop {
            interval.tick().await;
            sweep_once(&state, now_ms()).await;
        }
    })
}

/// One sweep over every room. Returns how many cursors were purged.
pub async fn sweep_once(state: &AppState, now: i64) -> usize {
    let idle_ms = i64::try_from(state.config.cursor_idle_timeout.as_millis()).unwrap_or(i64::MAX);
    let purged = state.rooms.sweep_cursors(now, idle_ms).await;
    if purged > 0 {
        debug!(purged, "idle cursors swept");
    }
    purged
}

#[cfg(test)]
#[path = "cursor_test.rs"]
mod tests;
