//! Isolation levels and backend capability flags

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Isolation contract requested by the caller
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionConsistency {
    /// Serializable: transactions behave as if run one after another
    #[default]
    Strict,
    /// Repeatable read: one snapshot per transaction, formula updates may be stale
    Relaxed,
    /// Read uncommitted. Default for the compatibility layer.
    None,
}

impl TransactionConsistency {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionConsistency::Strict => "STRICT",
            TransactionConsistency::Relaxed => "RELAXED",
            TransactionConsistency::None => "NONE",
        }
    }

    /// Whether an emulated backend needs coordination for this level
    pub fn needs_coordination(&self) -> bool {
        !matches!(self, TransactionConsistency::None)
    }
}

impl fmt::Display for TransactionConsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionConsistency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STRICT" => Ok(TransactionConsistency::Strict),
            "RELAXED" => Ok(TransactionConsistency::Relaxed),
            "NONE" => Ok(TransactionConsistency::None),
            _ => Err(format!("unknown consistency level {s:?}")),
        }
    }
}

/// Whether a backend provides isolation natively
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionConsistencyEmulation {
    /// The backend guarantees every consistency level itself
    Strong,
    /// The coordinator has to simulate isolation for this backend
    Emulated,
}
