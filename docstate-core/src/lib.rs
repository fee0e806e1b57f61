//! DocState Core - Document, Key, Error and Configuration Types
//!
//! Pure data structures shared by the cache and the reconciling store.
//! This crate performs no I/O apart from reading configuration files.

pub mod config;
pub mod error;
pub mod key;

pub use config::{
    CacheConfig, ReconcileConfig, StoreConfig, DEFAULT_CACHE_SIZE, DEFAULT_CHUNK_SIZE,
    DEFAULT_COLLECTION, DEFAULT_CONCURRENCY, DEFAULT_MAX_AGE,
};
pub use error::{
    ConfigError, DocStateError, DocStateResult, RemoteOperation, StorageError,
};
pub use key::{dedupe_by_key, dedupe_owned, DocKey, KeyField};

/// A state document: field name to JSON value.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Identifier field used when none is configured.
pub const DEFAULT_ID_FIELD: &str = "id";
