//! Error types for landtable-state

use landtable_core::{CoreError, ErrorCode};
use thiserror::Error;

/// Result type alias using StateError
pub type Result<T> = std::result::Result<T, StateError>;

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum StateError {
    /// Workspace, table or database does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Configuration is present but inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration version this build does not understand
    #[error("Unsupported configuration version {0}")]
    UnsupportedVersion(u32),

    /// Stored configuration is not valid JSON for its schema
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed identifier inside configuration
    #[error(transparent)]
    Identifier(#[from] CoreError),
}

impl StateError {
    /// Create a not found error
    pub fn not_found(what: impl Into<String>) -> Self {
        StateError::NotFound(what.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        StateError::InvalidConfig(msg.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            StateError::NotFound(_) => ErrorCode::NotFound,
            _ => ErrorCode::InternalError,
        }
    }
}
