//! Error types for landtable-core

use crate::identifier::IdentifierKind;
use thiserror::Error;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors produced while decoding identifiers or evaluating formulas
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Identifier text is malformed
    #[error("Invalid identifier {input:?}: {reason}")]
    InvalidIdentifier { input: String, reason: &'static str },

    /// Identifier prefix is not a known kind
    #[error("Unknown identifier prefix {0:?}")]
    UnknownPrefix(String),

    /// Identifier parsed, but is of the wrong kind
    #[error("Expected {expected} identifier, got {found}")]
    KindMismatch {
        expected: IdentifierKind,
        found: IdentifierKind,
    },

    /// Key identifiers are opaque and never parsed as structured identifiers
    #[error("Key identifiers are opaque: {0:?}")]
    OpaqueKey(String),

    /// Foreign (Airtable-style) identifier could not be converted
    #[error("Invalid foreign identifier {input:?}: {reason}")]
    InvalidForeignId { input: String, reason: &'static str },

    /// Foreign identifier decodes to more than 14 bytes
    #[error("Foreign identifier too long: {0:?}")]
    ForeignIdTooLong(String),

    /// Formula source was empty
    #[error("Empty formula")]
    EmptyFormula,

    /// Formula could not be evaluated
    #[error("Formula error: {0}")]
    Formula(String),
}

impl CoreError {
    /// Create an invalid identifier error
    pub fn invalid_identifier(input: impl Into<String>, reason: &'static str) -> Self {
        CoreError::InvalidIdentifier {
            input: input.into(),
            reason,
        }
    }

    /// Create an invalid foreign identifier error
    pub fn invalid_foreign_id(input: impl Into<String>, reason: &'static str) -> Self {
        CoreError::InvalidForeignId {
            input: input.into(),
            reason,
        }
    }

    /// Create a formula evaluation error
    pub fn formula(msg: impl Into<String>) -> Self {
        CoreError::Formula(msg.into())
    }
}
