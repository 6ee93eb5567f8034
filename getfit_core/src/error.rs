//! Error types for the getfit_core library.

use crate::types::Version;
use std::io;
use std::time::Duration;
use uuid::Uuid;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for getfit_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before any store call
    #[error("Validation error: {0}")]
    Validation(String),

    /// No document (or nested element) matched the id for this owner
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    /// The aggregate exists but was modified since the caller last read it
    #[error(
        "{kind} {id} has been modified since it was read \
         (expected version {expected}, found {actual}); re-read and retry"
    )]
    VersionConflict {
        kind: &'static str,
        id: Uuid,
        expected: Version,
        actual: Version,
    },

    /// Username or email already taken
    #[error("User with this {field} already exists")]
    Duplicate { field: &'static str },

    /// Operation not allowed in the aggregate's current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Store call exceeded its per-operation deadline
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Password hashing error
    #[error("Password hash error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    /// Storage backend error
    #[error("Store error: {0}")]
    Store(String),
}

impl Error {
    /// Transient failures may succeed if simply retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Conflicts require a fresh read before retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::VersionConflict { .. })
    }
}
