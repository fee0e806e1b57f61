//! Error types for DocState operations

use thiserror::Error;

/// Remote operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOperation {
    FetchOne,
    FetchMany,
    BulkWrite,
}

impl std::fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RemoteOperation::FetchOne => "fetch_one",
            RemoteOperation::FetchMany => "fetch_many",
            RemoteOperation::BulkWrite => "bulk_write",
        };
        f.write_str(name)
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Cache lock poisoned")]
    LockPoisoned,

    #[error("Remote {operation} unavailable: {reason}")]
    RemoteUnavailable {
        operation: RemoteOperation,
        reason: String,
    },

    #[error("Remote rejected write to {collection}: {reason}")]
    RemoteRejected { collection: String, reason: String },

    #[error("Invalid response from remote {operation}: {reason}")]
    InvalidResponse {
        operation: RemoteOperation,
        reason: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },

    #[error("Failed to read config file {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Failed to parse config: {reason}")]
    Parse { reason: String },
}

/// Master error type for all DocState errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DocStateError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for DocState operations.
pub type DocStateResult<T> = Result<T, DocStateError>;

// =============================================================================
// TESTS
// =============================================================================
