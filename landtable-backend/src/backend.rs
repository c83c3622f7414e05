//! The backend contract
//!
//! Every database adapter implements [`DatabaseBackend`] and declares a
//! static [`BackendInformation`]. The coordinator consults the information to
//! decide whether it must emulate isolation before delegating, and the
//! [`BackendRegistry`](crate::registry::BackendRegistry) uses the config types
//! to route replicas to adapters.

use crate::consistency::{TransactionConsistency, TransactionConsistencyEmulation};
use crate::error::{BackendError, Result};
use crate::operation::TransactionOperation;
use crate::row::{ChangesetRow, OperationResult};
use crate::transaction::LandtableTransaction;
use async_trait::async_trait;
use landtable_core::DatabaseId;
use landtable_state::{DatabaseConfig, ReplicaSource, ReplicaSpec, TableConfig, WorkspaceConfig};
use serde_json::{Map, Value};
use std::fmt::Debug;

pub const DEFAULT_ID_COLUMN: &str = "id";
pub const DEFAULT_CREATED_AT_COLUMN: &str = "created_at";

/// Static capability descriptor of a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendInformation {
    pub transaction_type: TransactionConsistencyEmulation,
    /// Replica config `type` strings this backend accepts
    pub config_types: &'static [&'static str],
}

impl BackendInformation {
    pub fn accepts(&self, config_type: &str) -> bool {
        self.config_types.contains(&config_type)
    }

    pub fn is_emulated(&self) -> bool {
        self.transaction_type == TransactionConsistencyEmulation::Emulated
    }
}

/// A replica with its database reference resolved
#[derive(Clone, Debug, PartialEq)]
pub struct ReplicaConfig {
    /// Name used by field `rewrite` and `secondaryReplicas`
    pub name: String,
    /// Set when the replica references a stored database definition
    pub database: Option<DatabaseId>,
    pub config_type: String,
    /// Physical table name
    pub table_name: String,
    pub id_column: Option<String>,
    pub created_at_column: Option<String>,
    /// Passed through to the backend untouched
    pub credential_provider: Option<String>,
    pub settings: Map<String, Value>,
    pub delayed: bool,
}

impl ReplicaConfig {
    /// Resolve `spec` for `table`
    ///
    /// A replica referencing a database needs that database's definition;
    /// inline replicas carry everything themselves.
    pub fn resolve(
        spec: &ReplicaSpec,
        database: Option<&DatabaseConfig>,
        table: &TableConfig,
    ) -> Result<Self> {
        let table_name = spec.table_name().unwrap_or(&table.name).to_string();
        let (database_id, config_type, credential_provider, settings) = match &spec.source {
            ReplicaSource::Reference { database: name, .. } => {
                let database = database.ok_or_else(|| {
                    BackendError::invalid_replica(format!(
                        "replica {name:?} of table {} references an unknown database",
                        table.name
                    ))
                })?;
                (
                    Some(database.id),
                    database.config_type.clone(),
                    database.credential_provider.clone(),
                    database.settings.clone(),
                )
            }
            ReplicaSource::Inline(inline) => (
                None,
                inline.config_type.clone(),
                inline.credential_provider.clone(),
                Map::new(),
            ),
        };

        Ok(Self {
            name: spec.name().to_string(),
            database: database_id,
            config_type,
            table_name,
            id_column: spec.id_column.clone(),
            created_at_column: spec.created_at_column.clone(),
            credential_provider,
            settings,
            delayed: spec.delayed,
        })
    }

    pub fn id_column(&self) -> &str {
        self.id_column.as_deref().unwrap_or(DEFAULT_ID_COLUMN)
    }

    pub fn created_at_column(&self) -> &str {
        self.created_at_column
            .as_deref()
            .unwrap_or(DEFAULT_CREATED_AT_COLUMN)
    }
}

/// A database adapter
///
/// `exec_transaction` runs every operation in order against this backend
/// only and returns one result per operation, index-aligned. On error no
/// partial writes may be visible.
#[async_trait]
pub trait DatabaseBackend: Debug + Send + Sync {
    fn information(&self) -> BackendInformation;

    /// Acquire connections and handles
    async fn setup(&self) -> Result<()> {
        Ok(())
    }

    /// Release resources. Called even when `setup` failed part way.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn exec_transaction(
        &self,
        transaction: &LandtableTransaction,
        table: &TableConfig,
        replica: &ReplicaConfig,
        consistency: TransactionConsistency,
    ) -> Result<Vec<OperationResult>>;

    /// Execute a single operation with the same atomicity guarantee
    async fn exec_one(
        &self,
        op: &TransactionOperation,
        table: &TableConfig,
        replica: &ReplicaConfig,
        consistency: TransactionConsistency,
        use_id: bool,
    ) -> Result<OperationResult> {
        let transaction = LandtableTransaction::new(vec![op.clone()]).with_use_id(use_id);
        let mut results = self
            .exec_transaction(&transaction, table, replica, consistency)
            .await?;
        match (results.pop(), results.is_empty()) {
            (Some(result), true) => Ok(result),
            _ => Err(BackendError::execution(
                "backend returned the wrong number of results for one operation",
            )),
        }
    }

    /// Idempotent upsert used only for replication fan-out
    ///
    /// Creates rows that do not exist, overwrites the given columns of rows
    /// that do, and removes rows carried as tombstones.
    async fn batch_update_row(
        &self,
        table: &TableConfig,
        workspace: &WorkspaceConfig,
        replica: &ReplicaConfig,
        changeset: &[ChangesetRow],
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use landtable_state::ReplicaSpec;

    #[test]
    fn test_resolve_reference() {
        let db = DatabaseConfig::new("main", "memory_v0")
            .with_credential_provider("vault+http://vault:8200/");
        let table = TableConfig::new("users", ReplicaSpec::reference("main"));
        let replica = ReplicaConfig::resolve(&table.primary, Some(&db), &table).unwrap();
        assert_eq!(replica.name, "main");
        assert_eq!(replica.database, Some(db.id));
        assert_eq!(replica.table_name, "users");
        assert_eq!(replica.config_type, "memory_v0");
        assert_eq!(
            replica.credential_provider.as_deref(),
            Some("vault+http://vault:8200/")
        );
        assert_eq!(replica.id_column(), "id");
    }

    #[test]
    fn test_resolve_reference_requires_database() {
        let table = TableConfig::new("users", ReplicaSpec::reference("main"));
        let err = ReplicaConfig::resolve(&table.primary, None, &table).unwrap_err();
        assert!(matches!(err, BackendError::InvalidReplica(_)));
    }

    #[test]
    fn test_resolve_inline() {
        let spec = ReplicaSpec::inline("memory_sheet_v0", "sheet", "People").delayed();
        let table = TableConfig::new("users", ReplicaSpec::reference("main"));
        let replica = ReplicaConfig::resolve(&spec, None, &table).unwrap();
        assert_eq!(replica.name, "sheet");
        assert_eq!(replica.table_name, "People");
        assert!(replica.database.is_none());
        assert!(replica.delayed);
    }

    #[test]
    fn test_information_accepts() {
        let info = BackendInformation {
            transaction_type: TransactionConsistencyEmulation::Emulated,
            config_types: &["airtable_v0"],
        };
        assert!(info.accepts("airtable_v0"));
        assert!(!info.accepts("postgres_v0"));
        assert!(info.is_emulated());
    }
}
