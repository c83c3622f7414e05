//! Coordinator options

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for [`TransactionCoordinator`](crate::TransactionCoordinator)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorOptions {
    /// How long to wait for an emulation lock
    pub lock_timeout_ms: u64,
    /// Bound on each immediate secondary's `batch_update_row`
    pub replication_timeout_ms: u64,
    /// Emulate isolation for backends without native support. When off,
    /// such backends can only run `NONE` transactions.
    pub emulation: bool,
    /// Hand committed writes to the worker
    pub notify_on_commit: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            replication_timeout_ms: 30_000,
            emulation: true,
            notify_on_commit: true,
        }
    }
}

impl CoordinatorOptions {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn replication_timeout(&self) -> Duration {
        Duration::from_millis(self.replication_timeout_ms)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_replication_timeout(mut self, timeout: Duration) -> Self {
        self.replication_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn without_emulation(mut self) -> Self {
        self.emulation = false;
        self
    }
}
