//! The configuration store contract

use crate::error::Result;
use crate::models::{DatabaseConfig, MetaConfig, TableConfig, WorkspaceConfig};
use async_trait::async_trait;
use landtable_core::WorkspaceId;
use std::fmt::Debug;
use std::sync::Arc;

/// Read access to Landtable configuration
///
/// Lookups accept either an identifier (`lwk…`, `ltb…`, `ldb…`) or a name /
/// alias. Returned values are shared and must be treated as read-only.
#[async_trait]
pub trait ConfigStore: Debug + Send + Sync {
    /// Global settings, if any have been published
    async fn fetch_meta(&self) -> Result<Option<Arc<MetaConfig>>>;

    async fn fetch_workspace(&self, workspace: &str) -> Result<Arc<WorkspaceConfig>>;

    async fn fetch_table(&self, workspace: &WorkspaceId, table: &str) -> Result<Arc<TableConfig>>;

    async fn fetch_database(&self, database: &str) -> Result<Arc<DatabaseConfig>>;
}

#[async_trait]
impl<T: ConfigStore + ?Sized> ConfigStore for Arc<T> {
    async fn fetch_meta(&self) -> Result<Option<Arc<MetaConfig>>> {
        (**self).fetch_meta().await
    }

    async fn fetch_workspace(&self, workspace: &str) -> Result<Arc<WorkspaceConfig>> {
        (**self).fetch_workspace(workspace).await
    }

    async fn fetch_table(&self, workspace: &WorkspaceId, table: &str) -> Result<Arc<TableConfig>> {
        (**self).fetch_table(workspace, table).await
    }

    async fn fetch_database(&self, database: &str) -> Result<Arc<DatabaseConfig>> {
        (**self).fetch_database(database).await
    }
}
