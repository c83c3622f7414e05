//! Transaction error types

use landtable_backend::{BackendError, FailType, TransactionConsistency, ValidationError};
use landtable_core::{ErrorCode, TableId};
use landtable_state::StateError;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using TransactionError
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Transaction-level failures
///
/// Every variant means the primary is unchanged.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// Malformed transaction, rejected before any backend call
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend cannot provide the requested consistency and nothing can emulate it
    #[error("{backend} cannot provide {consistency} consistency")]
    ConsistencyUnsupported {
        backend: String,
        consistency: TransactionConsistency,
    },

    /// A `failType` threshold was crossed on the primary
    #[error("precondition failed on operation {index}: {matched} rows matched, {fail_type} {threshold}")]
    PreconditionFailed {
        index: usize,
        fail_type: FailType,
        matched: usize,
        threshold: usize,
    },

    /// The emulation lock was not acquired in time
    #[error("timed out after {waited:?} waiting for the lock on table {table}")]
    LockTimeout { table: TableId, waited: Duration },

    /// Configuration missing or unreadable
    #[error("configuration error: {0}")]
    Config(#[from] StateError),

    /// The primary's engine failed
    #[error("backend execution failed: {0}")]
    BackendExecution(#[source] BackendError),

    /// The worker handoff is no longer accepting notifications
    #[error("worker handoff closed")]
    HandoffClosed,
}

impl From<BackendError> for TransactionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Validation(err) => TransactionError::Validation(err),
            BackendError::ConsistencyUnsupported {
                backend,
                consistency,
            } => TransactionError::ConsistencyUnsupported {
                backend,
                consistency,
            },
            BackendError::PreconditionFailed {
                index,
                fail_type,
                matched,
                threshold,
            } => TransactionError::PreconditionFailed {
                index,
                fail_type,
                matched,
                threshold,
            },
            other => TransactionError::BackendExecution(other),
        }
    }
}

impl TransactionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TransactionError::Validation(err) => err.code(),
            TransactionError::ConsistencyUnsupported { .. }
            | TransactionError::PreconditionFailed { .. } => ErrorCode::BadRequest,
            TransactionError::LockTimeout { .. } => ErrorCode::TemporarilyUnavailable,
            TransactionError::Config(err) => err.code(),
            TransactionError::BackendExecution(err) => err.code(),
            TransactionError::HandoffClosed => ErrorCode::InternalError,
        }
    }
}

/// One secondary that did not receive its changeset
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplicaFailure {
    pub replica: String,
    pub reason: String,
}

/// The primary committed but some immediate secondaries failed
///
/// Carried inside a successful outcome, never returned as an error.
#[derive(Error, Clone, Debug, PartialEq, Eq, Serialize)]
#[error("table {table} committed on the primary but {} secondaries failed", failures.len())]
pub struct ReplicationDegraded {
    pub table: TableId,
    pub failures: Vec<ReplicaFailure>,
}

impl ReplicationDegraded {
    pub fn replicas(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|failure| failure.replica.as_str())
    }
}
