//! Transaction operations
//!
//! Operations are an internally tagged union on `type`. The discriminators
//! (`fetch`, `delete`, `create`, `update`, `updateByFormula`) are part of the
//! wire contract. Each variant declares the shape of its result through
//! [`TransactionOperation::result_kind`].

use landtable_core::{Formula, RowId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Which rows an operation applies to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Target {
    /// A single row, addressed by its Landtable identifier
    Row { id: RowId },
    /// Every row for which the predicate holds
    Formula { formula: Formula },
}

impl Target {
    pub fn row(id: RowId) -> Self {
        Target::Row { id }
    }

    pub fn formula(formula: Formula) -> Self {
        Target::Formula { formula }
    }
}

/// Comparison that aborts a selection when it holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailType {
    Eq,
    Neq,
    Gt,
    Ge,
    Lt,
    Le,
}

impl FailType {
    /// Whether `matched` compared to `threshold` satisfies this relation
    pub fn crossed(&self, matched: usize, threshold: usize) -> bool {
        match self {
            FailType::Eq => matched == threshold,
            FailType::Neq => matched != threshold,
            FailType::Gt => matched > threshold,
            FailType::Ge => matched >= threshold,
            FailType::Lt => matched < threshold,
            FailType::Le => matched <= threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailType::Eq => "eq",
            FailType::Neq => "neq",
            FailType::Gt => "gt",
            FailType::Ge => "ge",
            FailType::Lt => "lt",
            FailType::Le => "le",
        }
    }
}

impl fmt::Display for FailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared shape of `fetch` and `delete`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub target: Target,
    /// Maximum number of rows the operation applies to
    pub limit: usize,
    /// Rows are ordered by this formula's value before the limit applies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Formula>,
    /// Field projection by name or id. `None` returns every field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_type: Option<FailType>,
    /// Threshold compared by `failType`; defaults to `limit`
    #[serde(
        default,
        rename = "exec_target",
        alias = "execTarget",
        skip_serializing_if = "Option::is_none"
    )]
    pub exec_target: Option<usize>,
}

impl Selection {
    pub fn new(target: Target, limit: usize) -> Self {
        Self {
            target,
            limit,
            sort: None,
            fields: None,
            fail_type: None,
            exec_target: None,
        }
    }

    pub fn sorted_by(mut self, sort: Formula) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn fail_if(mut self, fail_type: FailType) -> Self {
        self.fail_type = Some(fail_type);
        self
    }

    pub fn with_exec_target(mut self, exec_target: usize) -> Self {
        self.exec_target = Some(exec_target);
        self
    }

    /// The value `failType` compares the match count against
    pub fn threshold(&self) -> usize {
        self.exec_target.unwrap_or(self.limit)
    }

    /// Check the failure precondition; returns `(fail_type, threshold)` when crossed
    pub fn precondition(&self, matched: usize) -> Option<(FailType, usize)> {
        let fail_type = self.fail_type?;
        let threshold = self.threshold();
        fail_type.crossed(matched, threshold).then_some((fail_type, threshold))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Create {
    pub row: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub target: Target,
    pub row: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateByFormula {
    pub target: Target,
    /// Field → formula computing its new value
    #[serde(rename = "exec_formula", alias = "execFormula")]
    pub exec_formula: BTreeMap<String, Formula>,
}

/// One step of a transaction
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransactionOperation {
    Fetch(Selection),
    Delete(Selection),
    Create(Create),
    Update(Update),
    UpdateByFormula(UpdateByFormula),
}

/// Result shape an operation declares
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// A [`RowResult`](crate::row::RowResult)
    Rows,
    /// A single [`Row`](crate::row::Row)
    Row,
}

impl TransactionOperation {
    pub fn fetch(selection: Selection) -> Self {
        TransactionOperation::Fetch(selection)
    }

    pub fn delete(selection: Selection) -> Self {
        TransactionOperation::Delete(selection)
    }

    pub fn create(row: Map<String, Value>) -> Self {
        TransactionOperation::Create(Create { row })
    }

    pub fn update(target: Target, row: Map<String, Value>) -> Self {
        TransactionOperation::Update(Update { target, row })
    }

    pub fn update_by_formula(target: Target, exec_formula: BTreeMap<String, Formula>) -> Self {
        TransactionOperation::UpdateByFormula(UpdateByFormula {
            target,
            exec_formula,
        })
    }

    /// The `type` discriminator
    pub fn type_name(&self) -> &'static str {
        match self {
            TransactionOperation::Fetch(_) => "fetch",
            TransactionOperation::Delete(_) => "delete",
            TransactionOperation::Create(_) => "create",
            TransactionOperation::Update(_) => "update",
            TransactionOperation::UpdateByFormula(_) => "updateByFormula",
        }
    }

    pub fn result_kind(&self) -> ResultKind {
        match self {
            TransactionOperation::Fetch(_)
            | TransactionOperation::Delete(_)
            | TransactionOperation::UpdateByFormula(_) => ResultKind::Rows,
            TransactionOperation::Create(_) | TransactionOperation::Update(_) => ResultKind::Row,
        }
    }

    pub fn is_fetch(&self) -> bool {
        matches!(self, TransactionOperation::Fetch(_))
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            TransactionOperation::Fetch(s) | TransactionOperation::Delete(s) => Some(&s.target),
            TransactionOperation::Update(op) => Some(&op.target),
            TransactionOperation::UpdateByFormula(op) => Some(&op.target),
            TransactionOperation::Create(_) => None,
        }
    }
}
