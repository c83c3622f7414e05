//! Delayed replication worker
//!
//! Consumes commit notifications from a [`ChannelHandoff`](crate::ChannelHandoff)
//! and delivers each delayed secondary's changeset through
//! `batch_update_row`. Failed deliveries are retried with exponential
//! backoff; once the retry budget is spent the write is logged and dropped.
//! None of this is visible to the caller that committed the transaction.

use crate::backoff::Backoff;
use crate::error::Result;
use crate::handoff::{CommitNotification, DelayedWrite};
use crate::resolve::ReplicaResolver;
use futures::future::join_all;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// How hard the worker tries before giving up on a delayed write
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> Backoff {
        Backoff::new(self.base_delay, self.max_delay)
    }
}

/// Counters for what the worker has done so far
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub notifications: u64,
    /// Delayed writes delivered
    pub applied: u64,
    /// Attempts after the first
    pub retries: u64,
    /// Delayed writes dropped after exhausting the retry budget
    pub abandoned: u64,
    /// Notifications that reported degraded immediate replication
    pub degraded: u64,
}

/// Applies delayed writes
#[derive(Debug, Clone)]
pub struct ReplicationWorker {
    resolver: Arc<ReplicaResolver>,
    policy: RetryPolicy,
    stats: Arc<Mutex<WorkerStats>>,
}

impl ReplicationWorker {
    pub fn new(resolver: Arc<ReplicaResolver>) -> Self {
        Self {
            resolver,
            policy: RetryPolicy::default(),
            stats: Arc::new(Mutex::new(WorkerStats::default())),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().clone()
    }

    /// Run in the background until every sender is dropped
    pub fn spawn(self, rx: mpsc::UnboundedReceiver<CommitNotification>) -> JoinHandle<WorkerStats> {
        tokio::spawn(async move { self.run(rx).await })
    }

    /// Process notifications until the channel closes, then return the final stats
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<CommitNotification>) -> WorkerStats {
        while let Some(notification) = rx.recv().await {
            self.process(notification).await;
        }
        tracing::debug!("replication worker stopped");
        self.stats()
    }

    /// Deliver every delayed write of one notification, concurrently per replica
    pub async fn process(&self, notification: CommitNotification) {
        self.stats.lock().notifications += 1;

        if let Some(degraded) = &notification.degraded {
            self.stats.lock().degraded += 1;
            tracing::warn!(
                transaction_id = %notification.transaction_id,
                table = %notification.table.name,
                replicas = ?degraded.replicas().collect::<Vec<_>>(),
                "immediate secondaries need reconciliation"
            );
        }
        if !notification.created.is_empty() {
            tracing::debug!(
                transaction_id = %notification.transaction_id,
                table = %notification.table.name,
                created = notification.created.len(),
                "new records committed"
            );
        }

        let span = tracing::debug_span!(
            "replication_worker",
            transaction_id = %notification.transaction_id,
            table = %notification.table.name,
            delayed = notification.delayed.len(),
        );
        join_all(
            notification
                .delayed
                .iter()
                .map(|write| self.deliver(&notification, write)),
        )
        .instrument(span)
        .await;
    }

    async fn deliver(&self, notification: &CommitNotification, write: &DelayedWrite) {
        let mut backoff = self.policy.backoff();
        let mut attempt = 1;
        loop {
            let err = match self.apply(notification, write).await {
                Ok(()) => {
                    self.stats.lock().applied += 1;
                    tracing::debug!(
                        replica = write.replica_name(),
                        rows = write.changeset.len(),
                        attempt,
                        "delayed write applied"
                    );
                    return;
                }
                Err(err) => err,
            };

            if attempt >= self.policy.max_attempts {
                self.stats.lock().abandoned += 1;
                tracing::error!(
                    replica = write.replica_name(),
                    rows = write.changeset.len(),
                    attempts = attempt,
                    error = %err,
                    "giving up on delayed write"
                );
                return;
            }

            let delay = backoff.next_delay();
            tracing::debug!(
                replica = write.replica_name(),
                attempt,
                error = %err,
                "delayed write failed, retrying in {:?}",
                delay
            );
            tokio::time::sleep(delay).await;
            self.stats.lock().retries += 1;
            attempt += 1;
        }
    }

    async fn apply(&self, notification: &CommitNotification, write: &DelayedWrite) -> Result<()> {
        let replica = self
            .resolver
            .resolve(&notification.table, &write.replica)
            .await?;
        replica
            .backend
            .batch_update_row(
                &notification.table,
                &notification.workspace,
                &replica.config,
                &write.changeset,
            )
            .await?;
        Ok(())
    }
}
