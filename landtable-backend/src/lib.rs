//! # Landtable Backend
//!
//! The contract between the transaction coordinator and database adapters.
//!
//! - [`operation`] / [`transaction`]: what callers submit
//! - [`row`]: what operations return, and the changeset rows replication sends
//! - [`consistency`]: requested isolation levels and backend capability flags
//! - [`backend`]: the [`DatabaseBackend`] trait and [`BackendInformation`]
//! - [`registry`]: adapters keyed by replica config type
//! - [`memory`]: an in-memory adapter in strong and emulated flavours

pub mod backend;
pub mod consistency;
pub mod error;
pub mod memory;
pub mod operation;
pub mod registry;
pub mod row;
pub mod transaction;

pub use backend::{BackendInformation, DatabaseBackend, ReplicaConfig};
pub use consistency::{TransactionConsistency, TransactionConsistencyEmulation};
pub use error::{BackendError, Result, ValidationError};
pub use memory::{MemoryBackend, StoredRow, MEMORY_CONFIG_TYPES, MEMORY_SHEET_CONFIG_TYPES};
pub use operation::{
    Create, FailType, ResultKind, Selection, Target, TransactionOperation, Update,
    UpdateByFormula,
};
pub use registry::BackendRegistry;
pub use row::{ChangesetRow, OperationResult, Row, RowResult};
pub use transaction::LandtableTransaction;
