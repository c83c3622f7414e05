//! Exponential backoff with jitter for delayed replication retries

use std::time::Duration;

/// Exponential backoff calculator with jitter
#[derive(Debug)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    attempt: u32,
}

impl Backoff {
    /// Start at `base`, doubling per attempt, capped at `max` (plus up to 25% jitter)
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            attempt: 0,
        }
    }

    /// Get the next delay and increment the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let exp = self
            .base_ms
            .saturating_mul(1u64.checked_shl(self.attempt).unwrap_or(u64::MAX));
        let capped = exp.min(self.max_ms);
        let jitter = rand::random::<u64>() % (capped / 4 + 1);
        self.attempt = self.attempt.saturating_add(1);
        Duration::from_millis(capped + jitter)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
