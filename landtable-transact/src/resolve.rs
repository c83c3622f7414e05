//! Replica resolution
//!
//! Turns a table's `ReplicaSpec` into a resolved [`ReplicaConfig`] and the
//! live backend registered for its config type.

use crate::error::Result;
use landtable_backend::{BackendRegistry, DatabaseBackend, ReplicaConfig};
use landtable_state::{ConfigStore, ReplicaSource, ReplicaSpec, TableConfig};
use std::fmt;
use std::sync::Arc;

/// A replica ready to receive calls
#[derive(Clone)]
pub struct ResolvedReplica {
    pub config: ReplicaConfig,
    pub backend: Arc<dyn DatabaseBackend>,
}

impl fmt::Debug for ResolvedReplica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedReplica")
            .field("replica", &self.config.name)
            .field("config_type", &self.config.config_type)
            .finish()
    }
}

/// Resolves replicas against the configuration store and backend registry
#[derive(Debug, Clone)]
pub struct ReplicaResolver {
    config: Arc<dyn ConfigStore>,
    registry: Arc<BackendRegistry>,
}

impl ReplicaResolver {
    pub fn new(config: Arc<dyn ConfigStore>, registry: Arc<BackendRegistry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &Arc<dyn ConfigStore> {
        &self.config
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub async fn resolve(&self, table: &TableConfig, spec: &ReplicaSpec) -> Result<ResolvedReplica> {
        let database = match &spec.source {
            ReplicaSource::Reference { database, .. } => {
                Some(self.config.fetch_database(database).await?)
            }
            ReplicaSource::Inline(_) => None,
        };

        let config = ReplicaConfig::resolve(spec, database.as_deref(), table)?;
        let backend = self.registry.backend_for(&config.config_type)?;
        Ok(ResolvedReplica { config, backend })
    }

    pub async fn resolve_primary(&self, table: &TableConfig) -> Result<ResolvedReplica> {
        self.resolve(table, &table.primary).await
    }
}
