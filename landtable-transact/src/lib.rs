//! # Landtable Transact
//!
//! Cross-replica transaction coordination.
//!
//! [`TransactionCoordinator::execute`] runs a transaction on a table's
//! primary, treating the primary's outcome as authoritative, and then
//! replicates the committed effects to the table's secondaries. Immediate
//! secondaries are written inline and concurrently; delayed secondaries are
//! handed to a [`ReplicationWorker`] through a [`WorkerHandoff`].
//!
//! Backends that cannot isolate transactions themselves get a per-table
//! emulation lock (see [`emulation`]).
//!
//! ## Example
//!
//! ```ignore
//! let (handoff, rx) = ChannelHandoff::channel();
//! let resolver = Arc::new(ReplicaResolver::new(config, registry));
//! let worker = ReplicationWorker::new(Arc::clone(&resolver)).spawn(rx);
//! let coordinator = TransactionCoordinator::new(resolver).with_handoff(Arc::new(handoff));
//!
//! let outcome = coordinator
//!     .execute_named("hq", "users", &txn, TransactionConsistency::Strict)
//!     .await?;
//! ```

mod backoff;
pub mod coordinator;
pub mod emulation;
pub mod error;
pub mod handoff;
pub mod options;
pub mod replication;
pub mod resolve;
pub mod worker;

pub use coordinator::{TransactionCoordinator, TransactionOutcome};
pub use emulation::{Attempt, AttemptState, EmulationGuard, LockMode, TableLocks};
pub use error::{ReplicaFailure, ReplicationDegraded, Result, TransactionError};
pub use handoff::{ChannelHandoff, CommitNotification, DelayedWrite, NoopHandoff, WorkerHandoff};
pub use options::CoordinatorOptions;
pub use replication::{build_changeset, collect_changes, ChangeSummary, ReplicaRole, RowChange};
pub use resolve::{ReplicaResolver, ResolvedReplica};
pub use worker::{ReplicationWorker, RetryPolicy, WorkerStats};
