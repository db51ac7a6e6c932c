//! Retention sweep task
//!
//! The engine upserts every record it sees, including ones outside the
//! retention window picked up incidentally, so without a sweep the cache
//! grows without bound. This task periodically deletes rows older than the
//! retention window plus a grace margin.

use crate::sync::store::ActivityStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Sweep tuning
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub interval: Duration,
    pub retention_days: u32,
    /// Extra days kept past the retention window before eviction
    pub grace_days: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            retention_days: 90,
            grace_days: 7,
        }
    }
}

impl SweepConfig {
    pub fn cutoff(&self, now: i64) -> i64 {
        now - (self.retention_days + self.grace_days) as i64 * 86_400
    }
}

/// Background task that evicts expired rows on a timer
///
/// Runs indefinitely until the task is dropped.
pub async fn retention_sweep_task(store: Arc<dyn ActivityStore>, config: SweepConfig) {
    log::info!(
        "⏰ Starting retention sweep (every {:?}, keep {} + {} days)",
        config.interval,
        config.retention_days,
        config.grace_days
    );

    let mut timer = interval(config.interval);

    loop {
        timer.tick().await;

        let cutoff = config.cutoff(chrono::Utc::now().timestamp());
        match store.evict_older_than(cutoff).await {
            Ok(0) => {}
            Ok(removed) => {
                log::info!("Retention sweep evicted {} expired records", removed);
            }
            Err(e) => {
                log::warn!("Retention sweep failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cutoff_includes_grace() {
        let config = SweepConfig {
            interval: Duration::from_secs(1),
            retention_days: 90,
            grace_days: 7,
        };
        let now = 10_000_000;
        assert_eq!(config.cutoff(now), now - 97 * 86_400);
    }
}
