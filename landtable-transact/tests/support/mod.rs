//! Shared harness for landtable-transact integration tests.
//!
//! Provides an in-memory deployment (config store, registry, resolver) and
//! instrumented backends:
//!
//! - [`RecordingBackend`] records every `batch_update_row` call and can be
//!   told to fail or stall per replica
//! - [`EventLogBackend`] is an emulated backend that logs when each
//!   transaction starts, runs each operation, and ends, so tests can check
//!   whether transactions interleaved

// Not every integration test crate uses every helper.
#![allow(dead_code)]

pub mod span_capture;

use async_trait::async_trait;
use landtable_backend::{
    BackendError, BackendInformation, BackendRegistry, ChangesetRow, DatabaseBackend,
    LandtableTransaction, MemoryBackend, OperationResult, ReplicaConfig, StoredRow,
    TransactionConsistency, TransactionConsistencyEmulation,
};
use landtable_state::{
    DatabaseConfig, FieldSpec, FieldType, MemoryConfigStore, ReplicaSpec, TableConfig,
    WorkspaceConfig,
};
use landtable_transact::{ReplicaResolver, TransactionCoordinator};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const RECORDING_CONFIG_TYPES: &[&str] = &["recording_v0"];
pub const EVENT_LOG_CONFIG_TYPES: &[&str] = &["event_log_v0"];

// =============================================================================
// Fixtures
// =============================================================================

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn txn(value: Value) -> LandtableTransaction {
    serde_json::from_value(value).expect("transaction JSON")
}

/// `users` on the `main` database with a `postgres` immediate secondary
///
/// `verified` only replicates to `postgres`, and `first_name` is stored as
/// `name` there.
pub fn users_table() -> TableConfig {
    TableConfig::new("users", ReplicaSpec::reference("main"))
        .with_field(FieldSpec::new("first_name", FieldType::ShortText).with_rewrite("postgres", "name"))
        .with_field(FieldSpec::new("verified", FieldType::Boolean).restricted_to(["postgres"]))
        .with_secondary(ReplicaSpec::inline("recording_v0", "postgres", "users"))
}

/// A single-counter table on the given primary
pub fn counter_table(primary: ReplicaSpec) -> TableConfig {
    TableConfig::new("counters", primary)
        .with_field(FieldSpec::new("name", FieldType::ShortText))
        .with_field(FieldSpec::new("count", FieldType::Number))
}

/// An in-memory deployment
pub struct Harness {
    pub store: MemoryConfigStore,
    pub workspace: Arc<WorkspaceConfig>,
    /// `main` (`memory_v0`)
    pub memory: Arc<MemoryBackend>,
    /// `sheet` (`memory_sheet_v0`)
    pub sheet: Arc<MemoryBackend>,
    pub recording: Arc<RecordingBackend>,
    /// `events` (`event_log_v0`)
    pub events: Arc<EventLogBackend>,
    pub resolver: Arc<ReplicaResolver>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_sheet(MemoryBackend::sheet())
    }

    /// Use `sheet` as the emulated memory backend
    pub fn with_sheet(sheet: MemoryBackend) -> Self {
        let memory = Arc::new(MemoryBackend::strong());
        let sheet = Arc::new(sheet);
        let recording = Arc::new(RecordingBackend::new());
        let events = Arc::new(EventLogBackend::new(Duration::from_millis(2)));

        let registry = BackendRegistry::new()
            .with(memory.clone())
            .and_then(|registry| registry.with(sheet.clone()))
            .and_then(|registry| registry.with(recording.clone()))
            .and_then(|registry| registry.with(events.clone()))
            .expect("register backends");

        let store = MemoryConfigStore::new();
        store.put_database(DatabaseConfig::new("main", "memory_v0"));
        store.put_database(DatabaseConfig::new("sheet", "memory_sheet_v0"));
        store.put_database(DatabaseConfig::new("events", "event_log_v0"));
        let workspace = WorkspaceConfig::new("hq");
        store.put_workspace(workspace.clone());

        let resolver = Arc::new(ReplicaResolver::new(
            Arc::new(store.clone()),
            Arc::new(registry),
        ));

        Self {
            store,
            workspace: Arc::new(workspace),
            memory,
            sheet,
            recording,
            events,
            resolver,
        }
    }

    /// Publish `table` to the config store
    pub fn add_table(&self, table: TableConfig) -> Arc<TableConfig> {
        self.store
            .put_table(self.workspace.id, table.clone())
            .expect("valid table");
        Arc::new(table)
    }

    pub fn coordinator(&self) -> TransactionCoordinator {
        TransactionCoordinator::new(Arc::clone(&self.resolver))
    }

    /// Resolved config of the replica called `name` (primary or secondary)
    pub async fn replica(&self, table: &TableConfig, name: &str) -> ReplicaConfig {
        let spec = table
            .replicas()
            .find(|replica| replica.name() == name)
            .unwrap_or_else(|| panic!("table {} has no replica {name}", table.name));
        self.resolver
            .resolve(table, spec)
            .await
            .expect("resolve replica")
            .config
    }
}

// =============================================================================
// RecordingBackend
// =============================================================================

/// One successful `batch_update_row`
#[derive(Debug, Clone)]
pub struct BatchCall {
    pub replica: String,
    pub changeset: Vec<ChangesetRow>,
}

/// Strong backend that records replication traffic
///
/// Storage is delegated to a [`MemoryBackend`].
#[derive(Debug)]
pub struct RecordingBackend {
    inner: MemoryBackend,
    exec_calls: AtomicUsize,
    fail_exec: Mutex<Option<String>>,
    /// Every `batch_update_row` call, by replica name, including failed ones
    attempts: Mutex<Vec<String>>,
    batches: Mutex<Vec<BatchCall>>,
    /// Replica name → remaining injected failures
    failures: Mutex<HashMap<String, usize>>,
    /// Replica name → stall before writing
    stalls: Mutex<HashMap<String, Duration>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            inner: MemoryBackend::strong(),
            exec_calls: AtomicUsize::new(0),
            fail_exec: Mutex::new(None),
            attempts: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            stalls: Mutex::new(HashMap::new()),
        }
    }

    /// Make every `exec_transaction` fail with `reason`
    pub fn fail_exec(&self, reason: &str) {
        *self.fail_exec.lock() = Some(reason.to_string());
    }

    /// Fail the next `times` batch writes to `replica`
    pub fn fail_batches(&self, replica: &str, times: usize) {
        self.failures.lock().insert(replica.to_string(), times);
    }

    /// Sleep for `delay` before every batch write to `replica`
    pub fn stall_batches(&self, replica: &str, delay: Duration) {
        self.stalls.lock().insert(replica.to_string(), delay);
    }

    pub fn exec_calls(&self) -> usize {
        self.exec_calls.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }

    pub fn batches(&self) -> Vec<BatchCall> {
        self.batches.lock().clone()
    }

    pub fn batches_for(&self, replica: &str) -> Vec<BatchCall> {
        self.batches()
            .into_iter()
            .filter(|call| call.replica == replica)
            .collect()
    }

    pub fn rows(&self, replica: &ReplicaConfig) -> Vec<StoredRow> {
        self.inner.rows(replica)
    }
}

#[async_trait]
impl DatabaseBackend for RecordingBackend {
    fn information(&self) -> BackendInformation {
        BackendInformation {
            transaction_type: TransactionConsistencyEmulation::Strong,
            config_types: RECORDING_CONFIG_TYPES,
        }
    }

    async fn exec_transaction(
        &self,
        transaction: &LandtableTransaction,
        table: &TableConfig,
        replica: &ReplicaConfig,
        consistency: TransactionConsistency,
    ) -> landtable_backend::Result<Vec<OperationResult>> {
        self.exec_calls.fetch_add(1, Ordering::SeqCst);
        let injected = self.fail_exec.lock().clone();
        if let Some(reason) = injected {
            return Err(BackendError::execution(reason));
        }
        self.inner
            .exec_transaction(transaction, table, replica, consistency)
            .await
    }

    async fn batch_update_row(
        &self,
        table: &TableConfig,
        workspace: &WorkspaceConfig,
        replica: &ReplicaConfig,
        changeset: &[ChangesetRow],
    ) -> landtable_backend::Result<()> {
        self.attempts.lock().push(replica.name.clone());

        let stall = self.stalls.lock().get(&replica.name).copied();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let fail = {
            let mut failures = self.failures.lock();
            match failures.get_mut(&replica.name) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if fail {
            return Err(BackendError::execution(format!(
                "injected failure writing {}",
                replica.name
            )));
        }

        self.inner
            .batch_update_row(table, workspace, replica, changeset)
            .await?;
        self.batches.lock().push(BatchCall {
            replica: replica.name.clone(),
            changeset: changeset.to_vec(),
        });
        Ok(())
    }
}

// =============================================================================
// EventLogBackend
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Begin(usize),
    Op(usize, usize),
    End(usize),
}

impl Event {
    fn transaction(&self) -> usize {
        match self {
            Event::Begin(n) | Event::Op(n, _) | Event::End(n) => *n,
        }
    }
}

/// Emulated backend that logs the shape of every transaction
///
/// Each operation yields for `pause` so that unsynchronised transactions
/// visibly interleave.
#[derive(Debug)]
pub struct EventLogBackend {
    inner: MemoryBackend,
    pause: Duration,
    next: AtomicUsize,
    events: Mutex<Vec<Event>>,
}

impl EventLogBackend {
    pub fn new(pause: Duration) -> Self {
        Self {
            inner: MemoryBackend::sheet(),
            pause,
            next: AtomicUsize::new(0),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Whether any transaction's events were split by another's
    pub fn interleaved(&self) -> bool {
        let events = self.events();
        let mut finished = std::collections::HashSet::new();
        let mut current: Option<usize> = None;
        for event in events {
            let n = event.transaction();
            if finished.contains(&n) {
                return true;
            }
            match current {
                Some(open) if open != n => return true,
                _ => {}
            }
            current = match event {
                Event::End(_) => {
                    finished.insert(n);
                    None
                }
                _ => Some(n),
            };
        }
        false
    }
}

#[async_trait]
impl DatabaseBackend for EventLogBackend {
    fn information(&self) -> BackendInformation {
        BackendInformation {
            transaction_type: TransactionConsistencyEmulation::Emulated,
            config_types: EVENT_LOG_CONFIG_TYPES,
        }
    }

    async fn exec_transaction(
        &self,
        transaction: &LandtableTransaction,
        table: &TableConfig,
        replica: &ReplicaConfig,
        consistency: TransactionConsistency,
    ) -> landtable_backend::Result<Vec<OperationResult>> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        self.events.lock().push(Event::Begin(n));
        for index in 0..transaction.ops.len() {
            tokio::time::sleep(self.pause).await;
            self.events.lock().push(Event::Op(n, index));
        }
        let results = self
            .inner
            .exec_transaction(transaction, table, replica, consistency)
            .await;
        self.events.lock().push(Event::End(n));
        results
    }

    async fn batch_update_row(
        &self,
        table: &TableConfig,
        workspace: &WorkspaceConfig,
        replica: &ReplicaConfig,
        changeset: &[ChangesetRow],
    ) -> landtable_backend::Result<()> {
        self.inner
            .batch_update_row(table, workspace, replica, changeset)
            .await
    }
}
