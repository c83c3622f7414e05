//! Rows and operation results

use crate::operation::ResultKind;
use chrono::{DateTime, Utc};
use landtable_core::RowId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row as returned to callers
///
/// `contents` is keyed by field id or field name depending on the
/// transaction's `use_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub created_at: DateTime<Utc>,
    pub contents: Map<String, Value>,
}

/// Result of `fetch`, `delete` and `updateByFormula`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RowResult {
    pub rows: Vec<Row>,
}

impl RowResult {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One result per operation, matching the operation's declared [`ResultKind`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationResult {
    Rows(RowResult),
    Row(Row),
}

impl OperationResult {
    pub fn kind(&self) -> ResultKind {
        match self {
            OperationResult::Rows(_) => ResultKind::Rows,
            OperationResult::Row(_) => ResultKind::Row,
        }
    }

    /// Every row carried by this result
    pub fn rows(&self) -> &[Row] {
        match self {
            OperationResult::Rows(result) => &result.rows,
            OperationResult::Row(row) => std::slice::from_ref(row),
        }
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            OperationResult::Row(row) => Some(row),
            OperationResult::Rows(_) => None,
        }
    }

    pub fn as_rows(&self) -> Option<&RowResult> {
        match self {
            OperationResult::Rows(result) => Some(result),
            OperationResult::Row(_) => None,
        }
    }
}

impl From<Row> for OperationResult {
    fn from(row: Row) -> Self {
        OperationResult::Row(row)
    }
}

impl From<RowResult> for OperationResult {
    fn from(result: RowResult) -> Self {
        OperationResult::Rows(result)
    }
}

/// Replication form of a row, sent to secondaries through `batch_update_row`
///
/// `contents` is keyed by the receiving replica's physical column names. A
/// `deleted` entry is a tombstone: the receiver removes the row if present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangesetRow {
    pub id: RowId,
    pub updated_at: DateTime<Utc>,
    pub contents: Map<String, Value>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl ChangesetRow {
    pub fn upsert(id: RowId, updated_at: DateTime<Utc>, contents: Map<String, Value>) -> Self {
        Self {
            id,
            updated_at,
            contents,
            deleted: false,
        }
    }

    pub fn tombstone(id: RowId, updated_at: DateTime<Utc>) -> Self {
        Self {
            id,
            updated_at,
            contents: Map::new(),
            deleted: true,
        }
    }
}
