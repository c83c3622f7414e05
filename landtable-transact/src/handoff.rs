//! Worker handoff
//!
//! On commit the coordinator emits a [`CommitNotification`]: the rows it
//! created, the changesets destined for delayed secondaries, and the
//! degraded-replication report if any immediate secondary failed. Whatever
//! consumes it does so outside the request path.

use crate::error::{ReplicationDegraded, Result, TransactionError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use landtable_backend::ChangesetRow;
use landtable_core::RowId;
use landtable_state::{ReplicaSpec, TableConfig, WorkspaceConfig};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A changeset the worker must deliver to one delayed secondary
#[derive(Clone, Debug, PartialEq)]
pub struct DelayedWrite {
    pub replica: ReplicaSpec,
    pub changeset: Vec<ChangesetRow>,
}

impl DelayedWrite {
    pub fn replica_name(&self) -> &str {
        self.replica.name()
    }
}

/// Emitted once per committed transaction that changed something
#[derive(Clone, Debug)]
pub struct CommitNotification {
    pub transaction_id: Uuid,
    pub workspace: Arc<WorkspaceConfig>,
    pub table: Arc<TableConfig>,
    /// Rows minted by `create` operations ("new record" events)
    pub created: Vec<RowId>,
    pub delayed: Vec<DelayedWrite>,
    pub degraded: Option<ReplicationDegraded>,
    pub committed_at: DateTime<Utc>,
}

/// Receiver side of commit notifications
#[async_trait]
pub trait WorkerHandoff: Debug + Send + Sync {
    async fn submit(&self, notification: CommitNotification) -> Result<()>;
}

/// Discards every notification
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandoff;

#[async_trait]
impl WorkerHandoff for NoopHandoff {
    async fn submit(&self, notification: CommitNotification) -> Result<()> {
        tracing::trace!(
            transaction_id = %notification.transaction_id,
            delayed = notification.delayed.len(),
            "dropping commit notification"
        );
        Ok(())
    }
}

/// Forwards notifications to an in-process consumer
#[derive(Debug, Clone)]
pub struct ChannelHandoff {
    tx: mpsc::UnboundedSender<CommitNotification>,
}

impl ChannelHandoff {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<CommitNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl WorkerHandoff for ChannelHandoff {
    async fn submit(&self, notification: CommitNotification) -> Result<()> {
        self.tx
            .send(notification)
            .map_err(|_| TransactionError::HandoffClosed)
    }
}
