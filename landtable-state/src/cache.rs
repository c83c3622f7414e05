//! Expiring configuration cache
//!
//! Wraps any [`ConfigStore`] and keeps each entry for a fixed expiry (10 s by
//! default). Entries are cached under the key they were requested by, their
//! id, and their name, so a later lookup by any of those hits. The
//! `invalidate_*` methods are the external invalidation signal.
//!
//! Expiry and capacity are enforced by `moka`, which evicts expired entries
//! during its own housekeeping rather than on the next lookup of that key.

use crate::error::Result;
use crate::models::{DatabaseConfig, MetaConfig, TableConfig, WorkspaceConfig};
use crate::store::ConfigStore;
use async_trait::async_trait;
use landtable_core::{DatabaseId, TableId, WorkspaceId};
use moka::sync::Cache;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime of a cached entry
pub const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_secs(10);

/// Default bound on entries per configuration kind
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

fn build_cache<K, V>(expiry: Duration, capacity: u64) -> Cache<K, Arc<V>>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(capacity)
        .time_to_live(expiry)
        .support_invalidation_closures()
        .build()
}

fn insert_all<K, V>(cache: &Cache<K, Arc<V>>, keys: impl IntoIterator<Item = K>, value: &Arc<V>)
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    for key in keys {
        cache.insert(key, Arc::clone(value));
    }
}

fn invalidate_where<K, V>(
    cache: &Cache<K, Arc<V>>,
    predicate: impl Fn(&K, &Arc<V>) -> bool + Send + Sync + 'static,
) where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    // Only fails when the cache was built without invalidation closures
    if let Err(err) = cache.invalidate_entries_if(predicate) {
        tracing::warn!(error = %err, "configuration cache invalidation rejected, clearing");
        cache.invalidate_all();
    }
}

/// A [`ConfigStore`] with an expiring read-through cache
pub struct CachedConfigStore<S> {
    inner: S,
    expiry: Duration,
    workspaces: Cache<String, Arc<WorkspaceConfig>>,
    tables: Cache<(WorkspaceId, String), Arc<TableConfig>>,
    databases: Cache<String, Arc<DatabaseConfig>>,
}

impl<S: Debug> Debug for CachedConfigStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedConfigStore")
            .field("inner", &self.inner)
            .field("expiry", &self.expiry)
            .field("workspace_entries", &self.workspaces.entry_count())
            .field("table_entries", &self.tables.entry_count())
            .field("database_entries", &self.databases.entry_count())
            .finish()
    }
}

impl<S: ConfigStore> CachedConfigStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_expiry(inner, DEFAULT_CACHE_EXPIRY)
    }

    pub fn with_expiry(inner: S, expiry: Duration) -> Self {
        Self::with_limits(inner, expiry, DEFAULT_CACHE_CAPACITY)
    }

    /// Cache with a custom expiry and a per-kind entry bound
    pub fn with_limits(inner: S, expiry: Duration, capacity: u64) -> Self {
        Self {
            inner,
            expiry,
            workspaces: build_cache(expiry, capacity),
            tables: build_cache(expiry, capacity),
            databases: build_cache(expiry, capacity),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn invalidate_workspace(&self, id: WorkspaceId) {
        invalidate_where(&self.workspaces, move |_, ws| ws.id == id);
        invalidate_where(&self.tables, move |(ws, _), _| *ws == id);
    }

    pub fn invalidate_table(&self, id: TableId) {
        invalidate_where(&self.tables, move |_, table| table.id == id);
    }

    pub fn invalidate_database(&self, id: DatabaseId) {
        invalidate_where(&self.databases, move |_, db| db.id == id);
    }

    pub fn invalidate_all(&self) {
        self.workspaces.invalidate_all();
        self.tables.invalidate_all();
        self.databases.invalidate_all();
    }

    /// Resident entries across all kinds, after pending evictions have run
    pub fn entry_count(&self) -> u64 {
        self.workspaces.run_pending_tasks();
        self.tables.run_pending_tasks();
        self.databases.run_pending_tasks();
        self.workspaces.entry_count() + self.tables.entry_count() + self.databases.entry_count()
    }
}

#[async_trait]
impl<S: ConfigStore> ConfigStore for CachedConfigStore<S> {
    async fn fetch_meta(&self) -> Result<Option<Arc<MetaConfig>>> {
        self.inner.fetch_meta().await
    }

    async fn fetch_workspace(&self, workspace: &str) -> Result<Arc<WorkspaceConfig>> {
        if let Some(hit) = self.workspaces.get(workspace) {
            tracing::debug!(workspace, "configuration cache hit");
            return Ok(hit);
        }

        tracing::debug!(workspace, "configuration cache miss");
        let resolved = self.inner.fetch_workspace(workspace).await?;
        insert_all(
            &self.workspaces,
            [
                workspace.to_string(),
                resolved.id.to_string(),
                resolved.name.clone(),
            ],
            &resolved,
        );
        Ok(resolved)
    }

    async fn fetch_table(&self, workspace: &WorkspaceId, table: &str) -> Result<Arc<TableConfig>> {
        let key = (*workspace, table.to_string());
        if let Some(hit) = self.tables.get(&key) {
            tracing::debug!(%workspace, table, "configuration cache hit");
            return Ok(hit);
        }

        tracing::debug!(%workspace, table, "configuration cache miss");
        let resolved = self.inner.fetch_table(workspace, table).await?;
        insert_all(
            &self.tables,
            [
                key,
                (*workspace, resolved.id.to_string()),
                (*workspace, resolved.name.clone()),
            ],
            &resolved,
        );
        Ok(resolved)
    }

    async fn fetch_database(&self, database: &str) -> Result<Arc<DatabaseConfig>> {
        if let Some(hit) = self.databases.get(database) {
            tracing::debug!(database, "configuration cache hit");
            return Ok(hit);
        }

        tracing::debug!(database, "configuration cache miss");
        let resolved = self.inner.fetch_database(database).await?;
        insert_all(
            &self.databases,
            [
                database.to_string(),
                resolved.id.to_string(),
                resolved.name.clone(),
            ],
            &resolved,
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConfigStore;
    use crate::models::{FieldSpec, FieldType, ReplicaSpec};

    fn setup() -> (MemoryConfigStore, WorkspaceId, TableConfig) {
        let store = MemoryConfigStore::new();
        let ws = WorkspaceConfig::new("sales");
        let ws_id = ws.id;
        store.put_workspace(ws);
        let table = TableConfig::new("users", ReplicaSpec::reference("main"))
            .with_field(FieldSpec::new("first_name", FieldType::ShortText));
        store.put_table(ws_id, table.clone()).unwrap();
        (store, ws_id, table)
    }

    #[tokio::test]
    async fn test_serves_stale_until_expiry() {
        let (store, ws_id, table) = setup();
        let cached = CachedConfigStore::with_expiry(store.clone(), Duration::from_millis(50));

        let first = cached.fetch_table(&ws_id, "users").await.unwrap();
        assert!(first.secondaries.is_empty());

        let updated = table.clone().with_secondary(ReplicaSpec::reference("pg"));
        store.put_table(ws_id, updated).unwrap();

        // Still cached, also under the table id
        let by_id = cached.fetch_table(&ws_id, &table.id.to_string()).await.unwrap();
        assert!(by_id.secondaries.is_empty());

        // moka keeps its own clock, so expiry needs real time to pass
        tokio::time::sleep(Duration::from_millis(120)).await;
        let refreshed = cached.fetch_table(&ws_id, "users").await.unwrap();
        assert_eq!(refreshed.secondaries.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_evicted() {
        let (store, ws_id, _) = setup();
        for n in 0..50 {
            let table = TableConfig::new(format!("t{n}"), ReplicaSpec::reference("main"))
                .with_field(FieldSpec::new("first_name", FieldType::ShortText));
            store.put_table(ws_id, table).unwrap();
        }
        let cached = CachedConfigStore::with_expiry(store.clone(), Duration::from_millis(50));
        for n in 0..50 {
            cached.fetch_table(&ws_id, &format!("t{n}")).await.unwrap();
        }
        assert!(cached.entry_count() > 0);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cached.entry_count(), 0);
    }

    #[tokio::test]
    async fn test_capacity_bounds_entries() {
        let (store, ws_id, _) = setup();
        for n in 0..50 {
            let table = TableConfig::new(format!("t{n}"), ReplicaSpec::reference("main"))
                .with_field(FieldSpec::new("first_name", FieldType::ShortText));
            store.put_table(ws_id, table).unwrap();
        }
        let cached = CachedConfigStore::with_limits(store.clone(), DEFAULT_CACHE_EXPIRY, 10);
        for n in 0..50 {
            cached.fetch_table(&ws_id, &format!("t{n}")).await.unwrap();
        }
        assert!(cached.entry_count() <= 10);
    }

    #[tokio::test]
    async fn test_invalidate_workspace_drops_its_tables() {
        let (store, ws_id, table) = setup();
        let cached = CachedConfigStore::new(store.clone());
        cached.fetch_table(&ws_id, "users").await.unwrap();

        store.put_table(ws_id, table.clone().read_only()).unwrap();
        cached.invalidate_workspace(ws_id);
        assert!(cached.fetch_table(&ws_id, "users").await.unwrap().read_only);
    }

    #[tokio::test]
    async fn test_invalidate_table() {
        let (store, ws_id, table) = setup();
        let cached = CachedConfigStore::new(store.clone());
        cached.fetch_table(&ws_id, "users").await.unwrap();

        store
            .put_table(ws_id, table.clone().read_only())
            .unwrap();
        assert!(!cached.fetch_table(&ws_id, "users").await.unwrap().read_only);

        cached.invalidate_table(table.id);
        assert!(cached.fetch_table(&ws_id, "users").await.unwrap().read_only);
    }

    #[tokio::test]
    async fn test_misses_are_not_cached() {
        let (store, ws_id, _) = setup();
        let cached = CachedConfigStore::new(store.clone());
        assert!(cached.fetch_database("main").await.is_err());

        store.put_database(DatabaseConfig::new("main", "memory_v0"));
        assert!(cached.fetch_database("main").await.is_ok());
        assert!(cached.fetch_workspace(&ws_id.to_string()).await.is_ok());
    }
}
