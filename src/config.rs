//! Service configuration from environment variables

use crate::sync::backoff::BackoffPolicy;
use crate::sync::engine::SyncSettings;
use crate::sync::sweeper::SweepConfig;
use std::env;
use std::time::Duration;

/// Configuration loaded from environment variables
///
/// Every knob has a default; the service runs out of the box.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream data API base URL
    pub base_url: String,

    /// Path to the SQLite cache database
    pub db_path: String,

    /// HTTP bind address
    pub host: String,
    pub port: u16,

    /// Trailing retention window in days
    pub retention_days: u32,

    /// Minimum refresh batch size for cached page reads
    pub refresh_floor: u32,

    /// Default page size for full-history pagination
    pub batch_size: u32,

    /// Hard pagination offset ceiling
    pub max_offset: u32,

    /// Fetch retry attempts and base delay
    pub fetch_max_attempts: u32,
    pub fetch_base_delay_ms: u64,
    pub fetch_jitter: bool,

    /// Retention sweep interval and grace margin
    pub sweep_interval_secs: u64,
    pub sweep_grace_days: u32,

    /// When set, raw first pages are dumped into this directory
    pub trace_dump_dir: Option<String>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `POLYFLOW_BASE_URL` (default: https://data-api.polymarket.com)
    /// - `POLYFLOW_DB_PATH` (default: data/polyflow.db)
    /// - `HOST` (default: 0.0.0.0), `PORT` (default: 8002)
    /// - `RETENTION_DAYS` (default: 90)
    /// - `REFRESH_FLOOR` (default: 100)
    /// - `BATCH_SIZE` (default: 100)
    /// - `MAX_PAGE_OFFSET` (default: 10000)
    /// - `FETCH_MAX_ATTEMPTS` (default: 3)
    /// - `FETCH_BASE_DELAY_MS` (default: 2000)
    /// - `FETCH_JITTER` (default: false)
    /// - `SWEEP_INTERVAL_SECS` (default: 3600)
    /// - `SWEEP_GRACE_DAYS` (default: 7)
    /// - `TRACE_DUMP_DIR` (optional, enables raw first-page dumps)
    pub fn from_env() -> Self {
        Self {
            base_url: env::var("POLYFLOW_BASE_URL")
                .unwrap_or_else(|_| "https://data-api.polymarket.com".to_string()),

            db_path: env::var("POLYFLOW_DB_PATH")
                .unwrap_or_else(|_| "data/polyflow.db".to_string()),

            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env_parse("PORT", 8002),

            retention_days: env_parse("RETENTION_DAYS", 90),
            refresh_floor: env_parse("REFRESH_FLOOR", 100),
            batch_size: env_parse("BATCH_SIZE", 100),
            max_offset: env_parse("MAX_PAGE_OFFSET", 10_000),

            fetch_max_attempts: env_parse("FETCH_MAX_ATTEMPTS", 3),
            fetch_base_delay_ms: env_parse("FETCH_BASE_DELAY_MS", 2_000),
            fetch_jitter: env_parse("FETCH_JITTER", false),

            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 3_600),
            sweep_grace_days: env_parse("SWEEP_GRACE_DAYS", 7),

            trace_dump_dir: env::var("TRACE_DUMP_DIR").ok(),
        }
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            retention_days: self.retention_days,
            refresh_floor: self.refresh_floor,
            max_offset: self.max_offset,
        }
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.fetch_max_attempts,
            base_delay: Duration::from_millis(self.fetch_base_delay_ms),
            jitter: self.fetch_jitter,
        }
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            interval: Duration::from_secs(self.sweep_interval_secs),
            retention_days: self.retention_days,
            grace_days: self.sweep_grace_days,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
