//! Engine configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! Every knob has a typed default so the server boots with no environment
//! at all. Unparseable values fall back to the default rather than failing
//! startup; zero is clamped to one for counts and capacities.

use std::time::Duration;

use crate::services::room::RoomLimits;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ROOM_MAX_MEMBERS: usize = 16;
pub const DEFAULT_OPERATION_LOG_CAP: usize = 500;
pub const DEFAULT_MAX_STROKE_POINTS: usize = 10_000;
pub const DEFAULT_SESSION_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_CURSOR_IDLE_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CURSOR_SWEEP_INTERVAL_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub port: u16,
    /// Member cap per room; a `join` beyond it is rejected.
    pub max_members: usize,
    /// Retention cap of each room's operation log.
    pub operation_log_cap: usize,
    /// Upper bound on points held by one freehand stroke.
    pub max_stroke_points: usize,
    /// Bounded queue size of each session's delivery channel.
    pub session_queue_capacity: usize,
    pub cursor_idle_timeout: Duration,
    pub cursor_sweep_interval: Duration,
    /// Enables the Postgres session store when set.
    pub database_url: Option<String>,
}

impl EngineConfig {
    /// Build config from environment variables.
    ///
    /// Optional:
    /// - `PORT`: default 3000
    /// - `ROOM_MAX_MEMBERS`: default 16
    /// - `OPERATION_LOG_CAP`: default 500
    /// - `MAX_STROKE_POINTS`: default 10000
    /// - `SESSION_QUEUE_CAPACITY`: default 256
    /// - `CURSOR_IDLE_TIMEOUT_MS`: default 30000
    /// - `CURSOR_SWEEP_INTERVAL_MS`: default 5000
    /// - `DATABASE_URL`: in-memory session store when absent
    #[must_use]
    pub fn from_env() -> Self {
        let database_url = match std::env::var("DATABASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(url),
            _ => None,
        };

        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            max_members: env_parse("ROOM_MAX_MEMBERS", DEFAULT_ROOM_MAX_MEMBERS).max(1),
            operation_log_cap: env_parse("OPERATION_LOG_CAP", DEFAULT_OPERATION_LOG_CAP).max(1),
            max_stroke_points: env_parse("MAX_STROKE_POINTS", DEFAULT_MAX_STROKE_POINTS).max(2),
            session_queue_capacity: env_parse("SESSION_QUEUE_CAPACITY", DEFAULT_SESSION_QUEUE_CAPACITY).max(1),
            cursor_idle_timeout: Duration::from_millis(env_parse(
                "CURSOR_IDLE_TIMEOUT_MS",
                DEFAULT_CURSOR_IDLE_TIMEOUT_MS,
            )),
            cursor_sweep_interval: Duration::from_millis(
                env_parse("CURSOR_SWEEP_INTERVAL_MS", DEFAULT_CURSOR_SWEEP_INTERVAL_MS).max(1),
            ),
            database_url,
        }
    }

    /// Per-room limits derived from this config.
    #[must_use]
    pub fn room_limits(&self) -> RoomLimits {
        RoomLimits {
            max_members: self.max_members,
            operation_log_cap: self.operation_log_cap,
            max_stroke_points: self.max_stroke_points,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_members: DEFAULT_ROOM_MAX_MEMBERS,
            operation_log_cap: DEFAULT_OPERATION_LOG_CAP,
            max_stroke_points: DEFAULT_MAX_STROKE_POINTS,
            session_queue_capacity: DEFAULT_SESSION_QUEUE_CAPACITY,
            cursor_idle_timeout: Duration::from_millis(DEFAULT_CURSOR_IDLE_TIMEOUT_MS),
            cursor_sweep_interval: Duration::from_millis(DEFAULT_CURSOR_SWEEP_INTERVAL_MS),
            database_url: None,
        }
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
