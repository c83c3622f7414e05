//! In-memory configuration store
//!
//! Holds workspaces, tables, databases and aliases behind an `Arc<RwLock>`.
//! It can be loaded from a [`StateDocument`] or kept in sync with the metadata
//! store by feeding it keyspace events through [`MemoryConfigStore::apply`].

use crate::error::{Result, StateError};
use crate::keyspace::ConfigKey;
use crate::models::{
    DatabaseConfig, MetaConfig, StateDocument, TableConfig, WorkspaceConfig,
};
use crate::store::ConfigStore;
use async_trait::async_trait;
use landtable_core::{DatabaseId, TableId, WorkspaceId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    meta: Option<Arc<MetaConfig>>,
    workspaces: HashMap<WorkspaceId, Arc<WorkspaceConfig>>,
    workspace_aliases: HashMap<String, WorkspaceId>,
    tables: HashMap<(WorkspaceId, TableId), Arc<TableConfig>>,
    table_aliases: HashMap<(WorkspaceId, String), TableId>,
    databases: HashMap<DatabaseId, Arc<DatabaseConfig>>,
}

impl Inner {
    fn workspace_id(&self, workspace: &str) -> Option<WorkspaceId> {
        if let Ok(id) = WorkspaceId::parse(workspace) {
            return Some(id);
        }
        if let Some(id) = self.workspace_aliases.get(workspace) {
            return Some(*id);
        }
        self.workspaces
            .values()
            .find(|ws| ws.name == workspace)
            .map(|ws| ws.id)
    }

    fn table_id(&self, workspace: WorkspaceId, table: &str) -> Option<TableId> {
        if let Ok(id) = TableId::parse(table) {
            return Some(id);
        }
        if let Some(id) = self.table_aliases.get(&(workspace, table.to_string())) {
            return Some(*id);
        }
        self.tables
            .iter()
            .find(|((ws, _), config)| *ws == workspace && config.name == table)
            .map(|((_, id), _)| *id)
    }
}

/// In-memory configuration store
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<RwLock<Inner>>,
}

impl Debug for MemoryConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("MemoryConfigStore")
            .field("workspace_count", &inner.workspaces.len())
            .field("table_count", &inner.tables.len())
            .field("database_count", &inner.databases.len())
            .finish()
    }
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a state document, validating every table
    pub fn from_document(document: StateDocument) -> Result<Self> {
        let store = Self::new();
        if let Some(meta) = document.meta {
            store.inner.write().meta = Some(Arc::new(meta));
        }
        for database in document.databases {
            store.put_database(database);
        }
        for entry in document.workspaces {
            let workspace = entry.workspace.id;
            store.put_workspace(entry.workspace);
            for table in entry.tables {
                store.put_table(workspace, table)?;
            }
        }
        Ok(store)
    }

    /// Parse and load a JSON state document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let document: StateDocument = serde_json::from_slice(bytes)?;
        Self::from_document(document)
    }

    pub fn put_workspace(&self, workspace: WorkspaceConfig) {
        self.inner
            .write()
            .workspaces
            .insert(workspace.id, Arc::new(workspace));
    }

    /// Insert or replace a table after validating it
    pub fn put_table(&self, workspace: WorkspaceId, table: TableConfig) -> Result<()> {
        table.validate()?;
        self.inner
            .write()
            .tables
            .insert((workspace, table.id), Arc::new(table));
        Ok(())
    }

    pub fn put_database(&self, database: DatabaseConfig) {
        self.inner
            .write()
            .databases
            .insert(database.id, Arc::new(database));
    }

    pub fn alias_workspace(&self, alias: impl Into<String>, workspace: WorkspaceId) {
        self.inner
            .write()
            .workspace_aliases
            .insert(alias.into(), workspace);
    }

    pub fn alias_table(&self, workspace: WorkspaceId, alias: impl Into<String>, table: TableId) {
        self.inner
            .write()
            .table_aliases
            .insert((workspace, alias.into()), table);
    }

    /// Apply one metadata store event. A `None` value deletes the entry.
    ///
    /// Returns `false` when the key is outside the known layout; such events
    /// are logged and ignored.
    pub fn apply(&self, key: &str, value: Option<&[u8]>) -> Result<bool> {
        let Some(parsed) = ConfigKey::parse(key) else {
            tracing::warn!(key, "received unknown configuration event");
            return Ok(false);
        };
        tracing::debug!(key, deleted = value.is_none(), "configuration event");

        match (parsed, value) {
            (ConfigKey::Meta, Some(bytes)) => {
                let meta: MetaConfig = serde_json::from_slice(bytes)?;
                self.inner.write().meta = Some(Arc::new(meta));
            }
            (ConfigKey::Meta, None) => self.inner.write().meta = None,
            (ConfigKey::Database(id), Some(bytes)) => {
                let database: DatabaseConfig = serde_json::from_slice(bytes)?;
                expect_id(key, id, database.id)?;
                self.put_database(database);
            }
            (ConfigKey::Database(id), None) => {
                self.inner.write().databases.remove(&id);
            }
            (ConfigKey::Workspace(id), Some(bytes)) => {
                let workspace: WorkspaceConfig = serde_json::from_slice(bytes)?;
                expect_id(key, id, workspace.id)?;
                self.put_workspace(workspace);
            }
            (ConfigKey::Workspace(id), None) => {
                let mut inner = self.inner.write();
                inner.workspaces.remove(&id);
                inner.tables.retain(|(ws, _), _| *ws != id);
            }
            (ConfigKey::Table { workspace, table }, Some(bytes)) => {
                let config: TableConfig = serde_json::from_slice(bytes)?;
                expect_id(key, table, config.id)?;
                self.put_table(workspace, config)?;
            }
            (ConfigKey::Table { workspace, table }, None) => {
                self.inner.write().tables.remove(&(workspace, table));
            }
            (ConfigKey::WorkspaceAlias(alias), Some(bytes)) => {
                let target = WorkspaceId::parse(alias_target(bytes)?)?;
                self.alias_workspace(alias, target);
            }
            (ConfigKey::WorkspaceAlias(alias), None) => {
                self.inner.write().workspace_aliases.remove(&alias);
            }
            (ConfigKey::TableAlias { workspace, alias }, Some(bytes)) => {
                let target = TableId::parse(alias_target(bytes)?)?;
                self.alias_table(workspace, alias, target);
            }
            (ConfigKey::TableAlias { workspace, alias }, None) => {
                self.inner.write().table_aliases.remove(&(workspace, alias));
            }
        }

        Ok(true)
    }
}

fn expect_id<T: PartialEq + std::fmt::Display>(key: &str, expected: T, found: T) -> Result<()> {
    if expected != found {
        return Err(StateError::invalid_config(format!(
            "{key} holds configuration for {found}"
        )));
    }
    Ok(())
}

fn alias_target(bytes: &[u8]) -> Result<&str> {
    std::str::from_utf8(bytes)
        .map(str::trim)
        .map_err(|_| StateError::invalid_config("alias target is not UTF-8"))
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn fetch_meta(&self) -> Result<Option<Arc<MetaConfig>>> {
        Ok(self.inner.read().meta.clone())
    }

    async fn fetch_workspace(&self, workspace: &str) -> Result<Arc<WorkspaceConfig>> {
        let inner = self.inner.read();
        inner
            .workspace_id(workspace)
            .and_then(|id| inner.workspaces.get(&id).cloned())
            .ok_or_else(|| StateError::not_found(format!("workspace {workspace}")))
    }

    async fn fetch_table(&self, workspace: &WorkspaceId, table: &str) -> Result<Arc<TableConfig>> {
        let inner = self.inner.read();
        inner
            .table_id(*workspace, table)
            .and_then(|id| inner.tables.get(&(*workspace, id)).cloned())
            .ok_or_else(|| StateError::not_found(format!("table {workspace}/{table}")))
    }

    async fn fetch_database(&self, database: &str) -> Result<Arc<DatabaseConfig>> {
        let inner = self.inner.read();
        let found = match DatabaseId::parse(database) {
            Ok(id) => inner.databases.get(&id).cloned(),
            Err(_) => inner
                .databases
                .values()
                .find(|db| db.name == database)
                .cloned(),
        };
        found.ok_or_else(|| StateError::not_found(format!("database {database}")))
    }
}
