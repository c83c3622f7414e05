//! In-memory backend
//!
//! Two flavours share one implementation:
//!
//! - [`MemoryBackend::strong`] (`memory_v0`) serializes transactions per
//!   table itself, like a SQL engine at `SERIALIZABLE`.
//! - [`MemoryBackend::sheet`] (`memory_sheet_v0`) has no isolation of its own,
//!   like a spreadsheet API, so the coordinator has to emulate it.
//!
//! A transaction runs against a private working copy taken when it starts.
//! Its writes are applied to the shared table in one step at the end, so a
//! failed transaction leaves nothing behind. Rows are stored under each
//! replica's physical column names.

use crate::backend::{BackendInformation, DatabaseBackend, ReplicaConfig};
use crate::consistency::{TransactionConsistency, TransactionConsistencyEmulation};
use crate::error::{BackendError, Result, ValidationError};
use crate::operation::{Selection, Target, TransactionOperation};
use crate::row::{ChangesetRow, OperationResult, Row, RowResult};
use crate::transaction::LandtableTransaction;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use landtable_core::{cmp_values, BasicEvaluator, FormulaEvaluator, RowId, RowView};
use landtable_state::{TableConfig, WorkspaceConfig};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

pub const MEMORY_CONFIG_TYPES: &[&str] = &["memory_v0"];
pub const MEMORY_SHEET_CONFIG_TYPES: &[&str] = &["memory_sheet_v0"];

/// A row as stored, keyed by physical column
#[derive(Clone, Debug, PartialEq)]
pub struct StoredRow {
    pub id: RowId,
    pub created_at: DateTime<Utc>,
    pub columns: Map<String, Value>,
}

#[derive(Default)]
struct StoredTable {
    rows: RwLock<Vec<StoredRow>>,
    /// Held for a whole transaction by the strong flavour
    serial: tokio::sync::Mutex<()>,
}

enum Write {
    Upsert(StoredRow),
    Delete(RowId),
}

/// Rows visible to one transaction plus the writes it made
struct WorkingCopy {
    rows: Vec<StoredRow>,
    writes: Vec<Write>,
}

impl WorkingCopy {
    fn new(rows: Vec<StoredRow>) -> Self {
        Self {
            rows,
            writes: Vec::new(),
        }
    }

    fn position(&self, id: &RowId) -> Option<usize> {
        self.rows.iter().position(|row| row.id == *id)
    }

    fn upsert(&mut self, row: StoredRow) {
        match self.position(&row.id) {
            Some(index) => self.rows[index] = row.clone(),
            None => self.rows.push(row.clone()),
        }
        self.writes.push(Write::Upsert(row));
    }

    fn delete(&mut self, id: RowId) {
        self.rows.retain(|row| row.id != id);
        self.writes.push(Write::Delete(id));
    }

    /// Apply the recorded writes to the shared table
    fn commit(self, table: &StoredTable) {
        let mut rows = table.rows.write();
        for write in self.writes {
            match write {
                Write::Upsert(row) => match rows.iter_mut().find(|r| r.id == row.id) {
                    Some(existing) => *existing = row,
                    None => rows.push(row),
                },
                Write::Delete(id) => rows.retain(|r| r.id != id),
            }
        }
    }
}

/// What one transaction runs against
struct Scope<'a> {
    table: &'a TableConfig,
    replica: &'a ReplicaConfig,
    use_id: bool,
}

/// In-memory [`DatabaseBackend`]
pub struct MemoryBackend {
    information: BackendInformation,
    evaluator: Arc<dyn FormulaEvaluator>,
    /// Simulated round trip before every operation
    latency: Option<Duration>,
    tables: RwLock<HashMap<(String, String), Arc<StoredTable>>>,
}

impl Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("config_types", &self.information.config_types)
            .field("transaction_type", &self.information.transaction_type)
            .field("table_count", &self.tables.read().len())
            .finish()
    }
}

impl MemoryBackend {
    fn with_information(information: BackendInformation) -> Self {
        Self {
            information,
            evaluator: Arc::new(BasicEvaluator::new()),
            latency: None,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Natively serializable flavour (`memory_v0`)
    pub fn strong() -> Self {
        Self::with_information(BackendInformation {
            transaction_type: TransactionConsistencyEmulation::Strong,
            config_types: MEMORY_CONFIG_TYPES,
        })
    }

    /// Flavour without native isolation (`memory_sheet_v0`)
    pub fn sheet() -> Self {
        Self::with_information(BackendInformation {
            transaction_type: TransactionConsistencyEmulation::Emulated,
            config_types: MEMORY_SHEET_CONFIG_TYPES,
        })
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn FormulaEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn key(replica: &ReplicaConfig) -> (String, String) {
        let database = replica
            .database
            .map(|id| id.to_string())
            .unwrap_or_else(|| replica.name.clone());
        (database, replica.table_name.clone())
    }

    fn stored(&self, replica: &ReplicaConfig) -> Arc<StoredTable> {
        let key = Self::key(replica);
        if let Some(table) = self.tables.read().get(&key) {
            return Arc::clone(table);
        }
        Arc::clone(self.tables.write().entry(key).or_default())
    }

    /// Current rows of a replica's table
    pub fn rows(&self, replica: &ReplicaConfig) -> Vec<StoredRow> {
        self.stored(replica).rows.read().clone()
    }

    /// Current rows as flat records, including the id and created-at columns
    pub fn records(&self, replica: &ReplicaConfig) -> Vec<Map<String, Value>> {
        self.rows(replica)
            .into_iter()
            .map(|row| {
                let mut record = Map::new();
                record.insert(replica.id_column().to_string(), Value::String(row.id.to_string()));
                record.insert(
                    replica.created_at_column().to_string(),
                    Value::String(row.created_at.to_rfc3339()),
                );
                record.extend(row.columns);
                record
            })
            .collect()
    }

    /// Insert rows directly, bypassing transactions
    pub fn seed(&self, replica: &ReplicaConfig, rows: impl IntoIterator<Item = StoredRow>) {
        self.stored(replica).rows.write().extend(rows);
    }

    /// The logical row formulas are evaluated against: field name → value
    fn view(scope: &Scope<'_>, row: &StoredRow) -> RowView {
        scope
            .table
            .fields
            .iter()
            .map(|field| {
                let value = row
                    .columns
                    .get(field.column_for(&scope.replica.name))
                    .cloned()
                    .unwrap_or(Value::Null);
                (field.name.clone(), value)
            })
            .collect()
    }

    fn output(scope: &Scope<'_>, row: &StoredRow, fields: Option<&BTreeSet<String>>) -> Row {
        let contents = scope
            .table
            .resolve_columns(fields)
            .into_iter()
            .map(|field| {
                let value = row
                    .columns
                    .get(field.column_for(&scope.replica.name))
                    .cloned()
                    .unwrap_or(Value::Null);
                (scope.table.output_key(field, scope.use_id), value)
            })
            .collect();

        Row {
            id: row.id,
            created_at: row.created_at,
            contents,
        }
    }

    /// Write logical `values` into `row` under this replica's columns
    fn assign(
        scope: &Scope<'_>,
        index: usize,
        row: &mut StoredRow,
        values: impl IntoIterator<Item = (String, Value)>,
    ) -> Result<()> {
        for (key, value) in values {
            let field = scope.table.field(&key).ok_or(ValidationError::UnknownField {
                index,
                field: key.clone(),
            })?;
            row.columns
                .insert(field.column_for(&scope.replica.name).to_string(), value);
        }
        Ok(())
    }

    /// Indices of the rows `target` resolves to, in storage order
    fn matching(
        &self,
        scope: &Scope<'_>,
        working: &WorkingCopy,
        target: &Target,
    ) -> Result<Vec<usize>> {
        match target {
            Target::Row { id } => Ok(working.position(id).into_iter().collect()),
            Target::Formula { formula } => {
                let mut matched = Vec::new();
                for (index, row) in working.rows.iter().enumerate() {
                    if self.evaluator.matches(formula, &Self::view(scope, row))? {
                        matched.push(index);
                    }
                }
                Ok(matched)
            }
        }
    }

    /// Resolve, sort, check the precondition, then apply the limit
    fn select(
        &self,
        scope: &Scope<'_>,
        index: usize,
        working: &WorkingCopy,
        selection: &Selection,
    ) -> Result<Vec<usize>> {
        let mut matched = self.matching(scope, working, &selection.target)?;

        if let Some(sort) = &selection.sort {
            let mut keyed = Vec::with_capacity(matched.len());
            for position in matched {
                let key = self
                    .evaluator
                    .evaluate(sort, &Self::view(scope, &working.rows[position]))?;
                keyed.push((key, position));
            }
            keyed.sort_by(|(a, _), (b, _)| cmp_values(a, b));
            matched = keyed.into_iter().map(|(_, position)| position).collect();
        }

        if let Some((fail_type, threshold)) = selection.precondition(matched.len()) {
            return Err(BackendError::PreconditionFailed {
                index,
                fail_type,
                matched: matched.len(),
                threshold,
            });
        }

        matched.truncate(selection.limit);
        Ok(matched)
    }

    fn exec_op(
        &self,
        scope: &Scope<'_>,
        index: usize,
        op: &TransactionOperation,
        working: &mut WorkingCopy,
    ) -> Result<OperationResult> {
        match op {
            TransactionOperation::Fetch(selection) => {
                let selected = self.select(scope, index, working, selection)?;
                let rows = selected
                    .into_iter()
                    .map(|position| {
                        Self::output(scope, &working.rows[position], selection.fields.as_ref())
                    })
                    .collect();
                Ok(RowResult::new(rows).into())
            }
            TransactionOperation::Delete(selection) => {
                let selected = self.select(scope, index, working, selection)?;
                let removed: Vec<StoredRow> = selected
                    .into_iter()
                    .map(|position| working.rows[position].clone())
                    .collect();
                let mut rows = Vec::with_capacity(removed.len());
                for row in removed {
                    rows.push(Self::output(scope, &row, selection.fields.as_ref()));
                    working.delete(row.id);
                }
                Ok(RowResult::new(rows).into())
            }
            TransactionOperation::Create(create) => {
                let mut row = StoredRow {
                    id: RowId::generate(),
                    created_at: Utc::now(),
                    columns: Map::new(),
                };
                Self::assign(scope, index, &mut row, create.row.clone())?;
                let output = Self::output(scope, &row, None);
                working.upsert(row);
                Ok(output.into())
            }
            TransactionOperation::Update(update) => {
                let matched = self.matching(scope, working, &update.target)?;
                let position = match (matched.as_slice(), &update.target) {
                    ([position], _) => *position,
                    ([], Target::Row { id }) => return Err(BackendError::RowNotFound(*id)),
                    (_, _) => {
                        return Err(BackendError::TargetNotUnique {
                            index,
                            matched: matched.len(),
                        })
                    }
                };
                let mut row = working.rows[position].clone();
                Self::assign(scope, index, &mut row, update.row.clone())?;
                let output = Self::output(scope, &row, None);
                working.upsert(row);
                Ok(output.into())
            }
            TransactionOperation::UpdateByFormula(update) => {
                let matched = self.matching(scope, working, &update.target)?;
                let mut rows = Vec::with_capacity(matched.len());
                for position in matched {
                    let mut row = working.rows[position].clone();
                    let view = Self::view(scope, &row);
                    let mut computed = Vec::with_capacity(update.exec_formula.len());
                    for (field, formula) in &update.exec_formula {
                        computed.push((field.clone(), self.evaluator.evaluate(formula, &view)?));
                    }
                    Self::assign(scope, index, &mut row, computed)?;
                    rows.push(Self::output(scope, &row, None));
                    working.upsert(row);
                }
                Ok(RowResult::new(rows).into())
            }
        }
    }
}

#[async_trait]
impl DatabaseBackend for MemoryBackend {
    fn information(&self) -> BackendInformation {
        self.information
    }

    async fn exec_transaction(
        &self,
        transaction: &LandtableTransaction,
        table: &TableConfig,
        replica: &ReplicaConfig,
        consistency: TransactionConsistency,
    ) -> Result<Vec<OperationResult>> {
        let stored = self.stored(replica);
        let _serial = match self.information.transaction_type {
            TransactionConsistencyEmulation::Strong => Some(stored.serial.lock().await),
            TransactionConsistencyEmulation::Emulated => None,
        };

        tracing::debug!(
            table = %table.name,
            replica = %replica.name,
            ops = transaction.ops.len(),
            %consistency,
            "memory backend executing transaction"
        );

        let scope = Scope {
            table,
            replica,
            use_id: transaction.use_id,
        };
        let mut working = WorkingCopy::new(stored.rows.read().clone());
        let mut results = Vec::with_capacity(transaction.ops.len());
        for (index, op) in transaction.ops.iter().enumerate() {
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            results.push(self.exec_op(&scope, index, op, &mut working)?);
        }

        if !working.writes.is_empty() {
            working.commit(&stored);
        }
        Ok(results)
    }

    async fn batch_update_row(
        &self,
        table: &TableConfig,
        _workspace: &WorkspaceConfig,
        replica: &ReplicaConfig,
        changeset: &[ChangesetRow],
    ) -> Result<()> {
        let stored = self.stored(replica);
        let _serial = match self.information.transaction_type {
            TransactionConsistencyEmulation::Strong => Some(stored.serial.lock().await),
            TransactionConsistencyEmulation::Emulated => None,
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut rows = stored.rows.write();
        for change in changeset {
            if change.deleted {
                rows.retain(|row| row.id != change.id);
                continue;
            }
            match rows.iter_mut().find(|row| row.id == change.id) {
                Some(existing) => existing.columns.extend(change.contents.clone()),
                None => rows.push(StoredRow {
                    id: change.id,
                    created_at: change.updated_at,
                    columns: change.contents.clone(),
                }),
            }
        }

        tracing::debug!(
            table = %table.name,
            replica = %replica.name,
            rows = changeset.len(),
            "memory backend applied changeset"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::FailType;
    use landtable_core::Formula;
    use landtable_state::{FieldSpec, FieldType, ReplicaSpec};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn table() -> TableConfig {
        TableConfig::new("users", ReplicaSpec::inline("memory_v0", "main", "users"))
            .with_field(FieldSpec::new("first_name", FieldType::ShortText).with_rewrite("main", "name"))
            .with_field(FieldSpec::new("score", FieldType::Number))
    }

    fn replica(table: &TableConfig) -> ReplicaConfig {
        ReplicaConfig::resolve(&table.primary, None, table).unwrap()
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn formula(source: &str) -> Formula {
        Formula::new(source).unwrap()
    }

    async fn run(
        backend: &MemoryBackend,
        table: &TableConfig,
        ops: Vec<TransactionOperation>,
    ) -> Result<Vec<OperationResult>> {
        let txn = LandtableTransaction::new(ops).with_use_id(false);
        backend
            .exec_transaction(&txn, table, &replica(table), TransactionConsistency::Strict)
            .await
    }

    async fn create(backend: &MemoryBackend, table: &TableConfig, name: &str, score: i64) -> RowId {
        let results = run(
            backend,
            table,
            vec![TransactionOperation::create(object(
                json!({"first_name": name, "score": score}),
            ))],
        )
        .await
        .unwrap();
        results[0].as_row().unwrap().id
    }

    #[tokio::test]
    async fn test_create_stores_physical_columns() {
        let backend = MemoryBackend::strong();
        let table = table();
        let id = create(&backend, &table, "Sarah", 1).await;

        let rows = backend.rows(&replica(&table));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].columns.get("name"), Some(&json!("Sarah")));
        assert!(rows[0].columns.get("first_name").is_none());

        let records = backend.records(&replica(&table));
        assert_eq!(records[0]["id"], json!(id.to_string()));
    }

    #[tokio::test]
    async fn test_results_keyed_by_id_or_name() {
        let backend = MemoryBackend::strong();
        let table = table();
        let id = create(&backend, &table, "Sarah", 1).await;

        let fetch = TransactionOperation::fetch(Selection::new(Target::row(id), 1));
        let by_id = backend
            .exec_one(&fetch, &table, &replica(&table), TransactionConsistency::Strict, true)
            .await
            .unwrap();
        let field_id = table.fields[0].id.to_string();
        assert_eq!(by_id.rows()[0].contents[&field_id], json!("Sarah"));

        let by_name = backend
            .exec_one(&fetch, &table, &replica(&table), TransactionConsistency::Strict, false)
            .await
            .unwrap();
        assert_eq!(by_name.rows()[0].contents["first_name"], json!("Sarah"));
    }

    #[tokio::test]
    async fn test_fetch_sort_limit_and_projection() {
        let backend = MemoryBackend::strong();
        let table = table();
        for (name, score) in [("c", 3), ("a", 1), ("b", 2)] {
            create(&backend, &table, name, score).await;
        }

        let selection = Selection::new(Target::formula(formula("{score} > 1")), 1)
            .sorted_by(formula("{score}"))
            .with_fields(["first_name"]);
        let results = run(&backend, &table, vec![TransactionOperation::fetch(selection)])
            .await
            .unwrap();
        let rows = results[0].rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].contents, object(json!({"first_name": "b"})));
    }

    #[tokio::test]
    async fn test_precondition_failure_writes_nothing() {
        let backend = MemoryBackend::strong();
        let table = table();
        create(&backend, &table, "a", 1).await;
        create(&backend, &table, "b", 1).await;

        let delete = Selection::new(Target::formula(formula("{score} = 1")), 10)
            .fail_if(FailType::Gt)
            .with_exec_target(1);
        let err = run(
            &backend,
            &table,
            vec![
                TransactionOperation::create(object(json!({"first_name": "c"}))),
                TransactionOperation::delete(delete),
            ],
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            BackendError::PreconditionFailed {
                index: 1,
                matched: 2,
                threshold: 1,
                ..
            }
        ));
        // The create before the failing delete was not applied
        assert_eq!(backend.rows(&replica(&table)).len(), 2);
    }

    #[tokio::test]
    async fn test_later_ops_observe_earlier_writes() {
        let backend = MemoryBackend::strong();
        let table = table();
        let results = run(
            &backend,
            &table,
            vec![
                TransactionOperation::create(object(json!({"first_name": "Sarah", "score": 1}))),
                TransactionOperation::update_by_formula(
                    Target::formula(formula("{first_name} = \"Sarah\"")),
                    BTreeMap::from([("score".to_string(), formula("{score} + 10"))]),
                ),
                TransactionOperation::fetch(Selection::new(Target::formula(formula("TRUE()")), 10)),
            ],
        )
        .await
        .unwrap();

        assert_eq!(results[1].rows()[0].contents["score"], json!(11));
        assert_eq!(results[2].rows()[0].contents["score"], json!(11));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let backend = MemoryBackend::sheet();
        let table = table();
        let id = create(&backend, &table, "Sarah", 1).await;

        let results = run(
            &backend,
            &table,
            vec![TransactionOperation::update(
                Target::row(id),
                object(json!({"score": 5})),
            )],
        )
        .await
        .unwrap();
        let row = results[0].as_row().unwrap();
        assert_eq!(row.contents["score"], json!(5));
        assert_eq!(row.contents["first_name"], json!("Sarah"));

        let results = run(
            &backend,
            &table,
            vec![TransactionOperation::delete(Selection::new(Target::row(id), 1))],
        )
        .await
        .unwrap();
        assert_eq!(results[0].rows()[0].id, id);
        assert!(backend.rows(&replica(&table)).is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_row() {
        let backend = MemoryBackend::strong();
        let table = table();
        let missing = RowId::generate();
        let err = run(
            &backend,
            &table,
            vec![TransactionOperation::update(
                Target::row(missing),
                object(json!({"score": 5})),
            )],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BackendError::RowNotFound(id) if id == missing));
    }

    #[tokio::test]
    async fn test_batch_update_row_is_idempotent() {
        let backend = MemoryBackend::sheet();
        let table = table();
        let replica = replica(&table);
        let workspace = WorkspaceConfig::new("sales");
        let id = RowId::generate();
        let changeset = vec![ChangesetRow::upsert(
            id,
            Utc::now(),
            object(json!({"name": "Sarah"})),
        )];

        for _ in 0..2 {
            backend
                .batch_update_row(&table, &workspace, &replica, &changeset)
                .await
                .unwrap();
        }
        assert_eq!(backend.rows(&replica).len(), 1);

        // Columns not in the changeset are kept
        let partial = vec![ChangesetRow::upsert(id, Utc::now(), object(json!({"score": 2})))];
        backend
            .batch_update_row(&table, &workspace, &replica, &partial)
            .await
            .unwrap();
        let row = &backend.rows(&replica)[0];
        assert_eq!(row.columns, object(json!({"name": "Sarah", "score": 2})));

        let tombstone = vec![ChangesetRow::tombstone(id, Utc::now())];
        for _ in 0..2 {
            backend
                .batch_update_row(&table, &workspace, &replica, &tombstone)
                .await
                .unwrap();
        }
        assert!(backend.rows(&replica).is_empty());
    }
}
