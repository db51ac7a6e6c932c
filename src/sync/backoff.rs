//! Retry backoff policy
//!
//! Extracted as a reusable value so the retry shape (attempt count, delay
//! growth, jitter) is independent of the fetch control flow.

use rand::Rng;
use std::time::Duration;

/// Bounded linear backoff: `base_delay * attempt`, optionally jittered
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt; later delays grow linearly
    pub base_delay: Duration,
    /// Add up to 50% random extra delay to avoid synchronized retries
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            jitter: false,
        }
    }
}

impl BackoffPolicy {
    /// Delay after a failed attempt (1-based attempt number)
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = self.base_delay * attempt.max(1);
        if self.jitter {
            let extra_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 2);
            delay + Duration::from_millis(extra_ms)
        } else {
            delay
        }
    }
}
