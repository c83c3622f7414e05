//! Transaction coordinator
//!
//! Runs a transaction against a table's primary and replicates the committed
//! effects:
//!
//! 1. Validate the transaction against the table
//! 2. Resolve the primary; take the emulation lock if its backend needs one
//! 3. Execute every operation on the primary. Failure here aborts the whole
//!    transaction and no secondary is touched.
//! 4. Release the lock, then shape one changeset per secondary
//! 5. Write immediate secondaries concurrently; their failures degrade the
//!    outcome but never fail it
//! 6. Hand delayed secondaries' changesets to the worker
//!
//! The caller gets the primary's results only.

use crate::emulation::{Attempt, AttemptState, EmulationGuard, LockMode, TableLocks};
use crate::error::{ReplicaFailure, ReplicationDegraded, Result, TransactionError};
use crate::handoff::{CommitNotification, DelayedWrite, NoopHandoff, WorkerHandoff};
use crate::options::CoordinatorOptions;
use crate::replication::{build_changeset, collect_changes, ChangeSummary, ReplicaRole};
use crate::resolve::ReplicaResolver;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use landtable_backend::{
    BackendError, LandtableTransaction, OperationResult, TransactionConsistency,
};
use landtable_state::{ReplicaSpec, TableConfig, WorkspaceConfig};
use serde::Serialize;
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// A committed transaction
#[derive(Clone, Debug, Serialize)]
pub struct TransactionOutcome {
    pub transaction_id: Uuid,
    /// The primary's results, index-aligned with the operations
    pub results: Vec<OperationResult>,
    /// Set when one or more immediate secondaries did not take the changeset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<ReplicationDegraded>,
    /// Delayed secondaries whose changesets went to the worker
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub delayed_replicas: Vec<String>,
}

impl TransactionOutcome {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Executes transactions with cross-replica atomicity
#[derive(Debug, Clone)]
pub struct TransactionCoordinator {
    resolver: Arc<ReplicaResolver>,
    locks: Arc<TableLocks>,
    handoff: Arc<dyn WorkerHandoff>,
    options: CoordinatorOptions,
}

impl TransactionCoordinator {
    pub fn new(resolver: Arc<ReplicaResolver>) -> Self {
        Self {
            resolver,
            locks: Arc::new(TableLocks::new()),
            handoff: Arc::new(NoopHandoff),
            options: CoordinatorOptions::default(),
        }
    }

    pub fn with_handoff(mut self, handoff: Arc<dyn WorkerHandoff>) -> Self {
        self.handoff = handoff;
        self
    }

    pub fn with_options(mut self, options: CoordinatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Share emulation locks with other coordinators in this process
    pub fn with_locks(mut self, locks: Arc<TableLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &Arc<TableLocks> {
        &self.locks
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    pub fn resolver(&self) -> &Arc<ReplicaResolver> {
        &self.resolver
    }

    /// Load the workspace and table from the configuration store, then execute
    pub async fn execute_named(
        &self,
        workspace: &str,
        table: &str,
        transaction: &LandtableTransaction,
        consistency: TransactionConsistency,
    ) -> Result<TransactionOutcome> {
        let config = self.resolver.config();
        let workspace = config.fetch_workspace(workspace).await?;
        let table = config.fetch_table(&workspace.id, table).await?;
        self.execute(workspace, table, transaction, consistency)
            .await
    }

    pub async fn execute(
        &self,
        workspace: Arc<WorkspaceConfig>,
        table: Arc<TableConfig>,
        transaction: &LandtableTransaction,
        consistency: TransactionConsistency,
    ) -> Result<TransactionOutcome> {
        let mut attempt = Attempt::new();
        let span = tracing::debug_span!(
            "landtable_txn",
            transaction_id = %attempt.id(),
            workspace = %workspace.name,
            table = %table.name,
            op_count = transaction.ops.len(),
            %consistency,
            read_only = transaction.read_only(),
            lock_mode = tracing::field::Empty,
            result_count = tracing::field::Empty,
            degraded = tracing::field::Empty,
        );

        async move {
            let outcome = self
                .run(&mut attempt, workspace, table, transaction, consistency)
                .await;
            if let Err(err) = &outcome {
                attempt.abort();
                tracing::debug!(error = %err, code = ?err.code(), "transaction aborted");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        attempt: &mut Attempt,
        workspace: Arc<WorkspaceConfig>,
        table: Arc<TableConfig>,
        transaction: &LandtableTransaction,
        consistency: TransactionConsistency,
    ) -> Result<TransactionOutcome> {
        let span = tracing::Span::current();

        transaction.validate(&table)?;

        let primary = self
            .resolver
            .resolve_primary(&table)
            .instrument(tracing::debug_span!("txn_resolve_primary"))
            .await?;

        let info = primary.backend.information();
        let guard = if info.is_emulated() && consistency.needs_coordination() {
            if !self.options.emulation {
                return Err(TransactionError::ConsistencyUnsupported {
                    backend: primary.config.config_type.clone(),
                    consistency,
                });
            }
            self.locks
                .acquire(table.id, consistency, self.options.lock_timeout())
                .instrument(tracing::debug_span!(
                    "txn_emulation_lock",
                    mode = LockMode::for_consistency(consistency).as_str()
                ))
                .await?
        } else {
            EmulationGuard::Unlocked
        };
        span.record("lock_mode", guard.mode().as_str());

        attempt.advance(AttemptState::Executing);
        let executed = primary
            .backend
            .exec_transaction(transaction, &table, &primary.config, consistency)
            .instrument(tracing::debug_span!(
                "txn_primary_exec",
                replica = %primary.config.name,
                config_type = %primary.config.config_type,
            ))
            .await;
        // Replication and handoff happen outside the lock
        drop(guard);
        let results = executed?;
        check_results(transaction, &results)?;
        attempt.advance(AttemptState::Committed);
        span.record("result_count", results.len());

        let mut outcome = TransactionOutcome {
            transaction_id: attempt.id(),
            results,
            degraded: None,
            delayed_replicas: Vec::new(),
        };

        let summary = collect_changes(&transaction.ops, &outcome.results);
        if summary.is_empty() {
            return Ok(outcome);
        }

        let committed_at = Utc::now();
        outcome.degraded = self
            .replicate(&workspace, &table, &summary, committed_at)
            .instrument(tracing::debug_span!(
                "txn_replicate",
                rows = summary.changes.len(),
                secondaries = table.immediate_secondaries().count(),
            ))
            .await;
        span.record("degraded", outcome.degraded.is_some());

        let delayed: Vec<DelayedWrite> = table
            .delayed_secondaries()
            .map(|replica| DelayedWrite {
                replica: replica.clone(),
                changeset: build_changeset(
                    &table,
                    replica.name(),
                    ReplicaRole::Secondary,
                    &summary.changes,
                    committed_at,
                ),
            })
            .collect();
        outcome.delayed_replicas = delayed
            .iter()
            .map(|write| write.replica_name().to_string())
            .collect();

        if self.options.notify_on_commit {
            let notification = CommitNotification {
                transaction_id: outcome.transaction_id,
                workspace,
                table: Arc::clone(&table),
                created: summary.created,
                delayed,
                degraded: outcome.degraded.clone(),
                committed_at,
            };
            if let Err(err) = self.handoff.submit(notification).await {
                tracing::warn!(error = %err, "commit notification not delivered");
            }
        } else if !delayed.is_empty() {
            tracing::warn!(
                replicas = ?outcome.delayed_replicas,
                "commit notifications disabled, delayed secondaries not written"
            );
            outcome.delayed_replicas.clear();
        }

        Ok(outcome)
    }

    /// Write every immediate secondary concurrently
    async fn replicate(
        &self,
        workspace: &WorkspaceConfig,
        table: &TableConfig,
        summary: &ChangeSummary,
        committed_at: DateTime<Utc>,
    ) -> Option<ReplicationDegraded> {
        let failures: Vec<ReplicaFailure> = join_all(
            table
                .immediate_secondaries()
                .map(|replica| self.replicate_one(workspace, table, replica, summary, committed_at)),
        )
        .await
        .into_iter()
        .filter_map(|result| result.err())
        .collect();

        if failures.is_empty() {
            return None;
        }

        let degraded = ReplicationDegraded {
            table: table.id,
            failures,
        };
        tracing::warn!(
            table = %table.name,
            replicas = ?degraded.replicas().collect::<Vec<_>>(),
            "replication degraded"
        );
        Some(degraded)
    }

    async fn replicate_one(
        &self,
        workspace: &WorkspaceConfig,
        table: &TableConfig,
        spec: &ReplicaSpec,
        summary: &ChangeSummary,
        committed_at: DateTime<Utc>,
    ) -> std::result::Result<(), ReplicaFailure> {
        let failure = |reason: String| ReplicaFailure {
            replica: spec.name().to_string(),
            reason,
        };

        let replica = self
            .resolver
            .resolve(table, spec)
            .await
            .map_err(|err| failure(err.to_string()))?;
        let changeset = build_changeset(
            table,
            &replica.config.name,
            ReplicaRole::Secondary,
            &summary.changes,
            committed_at,
        );

        let timeout = self.options.replication_timeout();
        match tokio::time::timeout(
            timeout,
            replica
                .backend
                .batch_update_row(table, workspace, &replica.config, &changeset),
        )
        .await
        {
            Ok(Ok(())) => {
                tracing::debug!(replica = %replica.config.name, rows = changeset.len(), "secondary written");
                Ok(())
            }
            Ok(Err(err)) => Err(failure(err.to_string())),
            Err(_) => Err(failure(format!("timed out after {timeout:?}"))),
        }
    }
}

/// The primary must return one result per operation, of the declared shape
fn check_results(transaction: &LandtableTransaction, results: &[OperationResult]) -> Result<()> {
    if results.len() != transaction.ops.len() {
        return Err(TransactionError::BackendExecution(BackendError::execution(
            format!(
                "primary returned {} results for {} operations",
                results.len(),
                transaction.ops.len()
            ),
        )));
    }
    for (index, (op, result)) in transaction.ops.iter().zip(results).enumerate() {
        if op.result_kind() != result.kind() {
            return Err(TransactionError::BackendExecution(BackendError::execution(
                format!(
                    "primary returned the wrong result shape for operation {index} ({})",
                    op.type_name()
                ),
            )));
        }
    }
    Ok(())
}
