//! Transactions as submitted by callers

use crate::error::ValidationError;
use crate::operation::TransactionOperation;
use landtable_state::TableConfig;
use serde::{Deserialize, Serialize};

fn default_use_id() -> bool {
    true
}

/// An ordered list of operations
///
/// Operations run in sequence and may observe the effects of earlier ones.
/// With `use_id` set, result contents are keyed by field id instead of name.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LandtableTransaction {
    pub ops: Vec<TransactionOperation>,
    #[serde(default = "default_use_id")]
    pub use_id: bool,
}

impl LandtableTransaction {
    pub fn new(ops: Vec<TransactionOperation>) -> Self {
        Self { ops, use_id: true }
    }

    pub fn with_use_id(mut self, use_id: bool) -> Self {
        self.use_id = use_id;
        self
    }

    /// Parse the wire form
    pub fn from_json(bytes: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(bytes).map_err(|e| ValidationError::Malformed(e.to_string()))
    }

    /// True iff every operation is a `fetch`
    pub fn read_only(&self) -> bool {
        self.ops.iter().all(TransactionOperation::is_fetch)
    }

    /// Reject transactions that cannot run against `table`
    pub fn validate(&self, table: &TableConfig) -> Result<(), ValidationError> {
        if table.read_only && !self.read_only() {
            return Err(ValidationError::ReadOnlyTable {
                table: table.name.clone(),
            });
        }

        for (index, op) in self.ops.iter().enumerate() {
            let known = |field: &String| {
                if table.field(field).is_some() {
                    Ok(())
                } else {
                    Err(ValidationError::UnknownField {
                        index,
                        field: field.clone(),
                    })
                }
            };

            match op {
                TransactionOperation::Fetch(selection) | TransactionOperation::Delete(selection) => {
                    if selection.exec_target.is_some() && selection.fail_type.is_none() {
                        return Err(ValidationError::MissingFailType { index });
                    }
                    if let Some(fields) = &selection.fields {
                        fields.iter().try_for_each(known)?;
                    }
                }
                TransactionOperation::Create(create) => {
                    create.row.keys().try_for_each(known)?;
                }
                TransactionOperation::Update(update) => {
                    update.row.keys().try_for_each(known)?;
                }
                TransactionOperation::UpdateByFormula(update) => {
                    if update.exec_formula.is_empty() {
                        return Err(ValidationError::EmptyExecFormula { index });
                    }
                    update.exec_formula.keys().try_for_each(known)?;
                }
            }
        }

        Ok(())
    }
}
