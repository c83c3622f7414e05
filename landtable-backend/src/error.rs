//! Error types for landtable-backend

use crate::consistency::TransactionConsistency;
use crate::operation::FailType;
use landtable_core::{CoreError, ErrorCode, RowId};
use thiserror::Error;

/// Result type alias using BackendError
pub type Result<T> = std::result::Result<T, BackendError>;

/// A transaction is malformed for the table it targets
///
/// Raised before any backend call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("table {table} is read-only")]
    ReadOnlyTable { table: String },

    #[error("operation {index}: unknown field {field:?}")]
    UnknownField { index: usize, field: String },

    #[error("operation {index}: exec_target specified but no operator to compare with")]
    MissingFailType { index: usize },

    #[error("operation {index}: updateByFormula without any formula")]
    EmptyExecFormula { index: usize },

    #[error("malformed transaction: {0}")]
    Malformed(String),
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ValidationError::ReadOnlyTable { .. } => ErrorCode::NotAllowed,
            _ => ErrorCode::BadRequest,
        }
    }
}

/// Backend contract errors
#[derive(Error, Debug)]
pub enum BackendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend cannot provide the requested isolation
    #[error("{backend} cannot provide {consistency} consistency")]
    ConsistencyUnsupported {
        backend: String,
        consistency: TransactionConsistency,
    },

    /// A `failType` threshold was crossed
    #[error(
        "operation {index}: {matched} rows matched, failing because {fail_type} {threshold} holds"
    )]
    PreconditionFailed {
        index: usize,
        fail_type: FailType,
        matched: usize,
        threshold: usize,
    },

    #[error("row not found: {0}")]
    RowNotFound(RowId),

    /// An `update` target did not resolve to exactly one row
    #[error("operation {index}: update target must match exactly one row, matched {matched}")]
    TargetNotUnique { index: usize, matched: usize },

    /// Formula could not be evaluated
    #[error("formula error: {0}")]
    Formula(#[from] CoreError),

    /// The underlying engine failed
    #[error("execution error: {0}")]
    Execution(String),

    #[error("invalid replica configuration: {0}")]
    InvalidReplica(String),

    #[error("no backend registered for config type {0:?}")]
    UnknownConfigType(String),

    #[error("config type {0:?} is already registered")]
    DuplicateConfigType(String),
}

impl BackendError {
    pub fn execution(msg: impl Into<String>) -> Self {
        BackendError::Execution(msg.into())
    }

    pub fn invalid_replica(msg: impl Into<String>) -> Self {
        BackendError::InvalidReplica(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            BackendError::Validation(err) => err.code(),
            BackendError::ConsistencyUnsupported { .. }
            | BackendError::PreconditionFailed { .. }
            | BackendError::TargetNotUnique { .. }
            | BackendError::Formula(_) => ErrorCode::BadRequest,
            BackendError::RowNotFound(_) => ErrorCode::NotFound,
            BackendError::Execution(_)
            | BackendError::InvalidReplica(_)
            | BackendError::UnknownConfigType(_)
            | BackendError::DuplicateConfigType(_) => ErrorCode::InternalError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        let read_only = BackendError::from(ValidationError::ReadOnlyTable {
            table: "users".into(),
        });
        assert_eq!(read_only.code(), ErrorCode::NotAllowed);

        let precondition = BackendError::PreconditionFailed {
            index: 0,
            fail_type: FailType::Gt,
            matched: 3,
            threshold: 1,
        };
        assert_eq!(precondition.code(), ErrorCode::BadRequest);
        assert_eq!(
            precondition.to_string(),
            "operation 0: 3 rows matched, failing because gt 1 holds"
        );
        assert_eq!(
            BackendError::execution("boom").code(),
            ErrorCode::InternalError
        );
    }
}
