//! # Landtable State
//!
//! Configuration for Landtable deployments: which tables exist, which fields
//! they expose, which database holds the primary copy and which secondaries
//! receive replicated writes.
//!
//! - [`models`]: table, field, replica, database and workspace configuration
//! - [`store`]: the [`ConfigStore`] lookup contract
//! - [`memory`]: an in-memory store fed by state documents or keyspace events
//! - [`cache`]: an expiring read-through cache over any store
//! - [`keyspace`]: the metadata store key layout

pub mod cache;
pub mod error;
pub mod keyspace;
pub mod memory;
pub mod models;
pub mod store;

pub use cache::{CachedConfigStore, DEFAULT_CACHE_EXPIRY};
pub use error::{Result, StateError};
pub use keyspace::{ConfigKey, KEYSPACE_ROOT};
pub use memory::MemoryConfigStore;
pub use models::{
    DatabaseConfig, FieldSpec, FieldType, InlineReplica, MetaConfig, ReplicaSource,
    ReplicaSpec, StateDocument, TableConfig, WorkspaceConfig, WorkspaceDocument,
    CONFIG_VERSION,
};
pub use store::ConfigStore;
