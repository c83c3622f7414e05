//! Replication changesets
//!
//! After the primary commits, its results are reduced to one change per
//! affected row and then shaped for each receiving replica: columns are
//! renamed per the replica's rewrite mapping and fields restricted to other
//! secondaries are dropped. The primary is never subject to restrictions.

use chrono::{DateTime, Utc};
use landtable_backend::{ChangesetRow, OperationResult, TransactionOperation};
use landtable_core::RowId;
use landtable_state::TableConfig;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Which side of a table a changeset is built for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplicaRole {
    Primary,
    Secondary,
}

/// The net effect of a transaction on one row
///
/// Contents are keyed the way the primary returned them, by field name or
/// by field id.
#[derive(Clone, Debug, PartialEq)]
pub enum RowChange {
    Upsert { id: RowId, contents: Map<String, Value> },
    Delete { id: RowId },
}

impl RowChange {
    pub fn id(&self) -> RowId {
        match self {
            RowChange::Upsert { id, .. } | RowChange::Delete { id } => *id,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, RowChange::Delete { .. })
    }
}

/// Everything a committed transaction changed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChangeSummary {
    /// One entry per row, in order of first touch
    pub changes: Vec<RowChange>,
    /// Rows minted by `create` operations
    pub created: Vec<RowId>,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn record(&mut self, positions: &mut HashMap<RowId, usize>, change: RowChange) {
        let Some(&position) = positions.get(&change.id()) else {
            positions.insert(change.id(), self.changes.len());
            self.changes.push(change);
            return;
        };

        let existing = &mut self.changes[position];
        match (existing, change) {
            (RowChange::Upsert { contents, .. }, RowChange::Upsert { contents: later, .. }) => {
                contents.extend(later);
            }
            (slot, later) => *slot = later,
        }
    }
}

/// Reduce the primary's results to per-row changes
///
/// `fetch` contributes nothing. Later contents override earlier ones for the
/// same row and a later delete replaces whatever came before it.
pub fn collect_changes(ops: &[TransactionOperation], results: &[OperationResult]) -> ChangeSummary {
    let mut summary = ChangeSummary::default();
    let mut positions = HashMap::new();

    for (op, result) in ops.iter().zip(results) {
        match op {
            TransactionOperation::Fetch(_) => {}
            TransactionOperation::Delete(_) => {
                for row in result.rows() {
                    summary.record(&mut positions, RowChange::Delete { id: row.id });
                }
            }
            TransactionOperation::Create(_)
            | TransactionOperation::Update(_)
            | TransactionOperation::UpdateByFormula(_) => {
                for row in result.rows() {
                    if matches!(op, TransactionOperation::Create(_)) {
                        summary.created.push(row.id);
                    }
                    summary.record(
                        &mut positions,
                        RowChange::Upsert {
                            id: row.id,
                            contents: row.contents.clone(),
                        },
                    );
                }
            }
        }
    }

    summary
}

/// Shape `changes` for the replica named `replica`
///
/// Keys that name no field of `table` are dropped.
pub fn build_changeset(
    table: &TableConfig,
    replica: &str,
    role: ReplicaRole,
    changes: &[RowChange],
    updated_at: DateTime<Utc>,
) -> Vec<ChangesetRow> {
    changes
        .iter()
        .map(|change| match change {
            RowChange::Delete { id } => ChangesetRow::tombstone(*id, updated_at),
            RowChange::Upsert { id, contents } => {
                let columns = contents
                    .iter()
                    .filter_map(|(key, value)| {
                        let field = table.field(key)?;
                        let allowed = role == ReplicaRole::Primary || field.replicates_to(replica);
                        allowed.then(|| (field.column_for(replica).to_string(), value.clone()))
                    })
                    .collect();
                ChangesetRow::upsert(*id, updated_at, columns)
            }
        })
        .collect()
}
