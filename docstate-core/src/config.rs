//! Configuration types

use crate::{ConfigError, DocStateResult, KeyField, DEFAULT_ID_FIELD};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default maximum number of cached documents.
pub const DEFAULT_CACHE_SIZE: usize = 1_000_000;
/// Default maximum age of a cached document (24 hours).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 3600);
/// Default remote collection name.
pub const DEFAULT_COLLECTION: &str = "index";
/// Default number of keys or documents per remote request.
pub const DEFAULT_CHUNK_SIZE: usize = 2500;
/// Default number of chunk requests in flight per batch call.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Configuration for the bounded key-value cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Maximum number of entries; the least recently used entry is evicted
    /// when a new key would exceed it.
    #[serde(alias = "cache_size")]
    pub capacity: usize,
    /// Entries older than this read as absent. `0` in a config file disables
    /// expiry.
    #[serde(
        rename = "max_age_ms",
        with = "duration_ms_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_age: Option<Duration>,
    /// Keep evicted and deleted documents until drained.
    #[serde(alias = "save_disposed")]
    pub track_disposed: bool,
    /// Identifier field used as the cache key.
    pub id_field: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_SIZE,
            max_age: Some(DEFAULT_MAX_AGE),
            track_disposed: false,
            id_field: DEFAULT_ID_FIELD.to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the max age of an entry.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Disable entry expiry.
    pub fn without_max_age(mut self) -> Self {
        self.max_age = None;
        self
    }

    /// Enable or disable disposal tracking.
    pub fn with_track_disposed(mut self, enabled: bool) -> Self {
        self.track_disposed = enabled;
        self
    }

    /// Set the identifier field.
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    /// Key accessor for the identifier field.
    pub fn key_field(&self) -> KeyField {
        KeyField::new(self.id_field.clone())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DocStateResult<()> {
        if self.capacity == 0 {
            return Err(invalid("capacity", self.capacity, "capacity must be greater than 0"));
        }

        if let Some(max_age) = self.max_age {
            if max_age.is_zero() {
                return Err(invalid(
                    "max_age",
                    format!("{:?}", max_age),
                    "max_age must be positive when set",
                ));
            }
        }

        if self.id_field.trim().is_empty() {
            return Err(invalid("id_field", &self.id_field, "id_field must not be empty"));
        }

        Ok(())
    }
}

/// Configuration for reconciling the cache with the remote document service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    /// Identifier field used as the cache key and remote primary key.
    pub id_field: String,
    /// Remote index/collection name.
    #[serde(alias = "index")]
    pub collection: String,
    /// Keys per multi-get request and documents per bulk request.
    pub chunk_size: usize,
    /// Maximum chunk requests in flight for a single batch call.
    pub concurrency: usize,
    /// Mirror writes to the remote store.
    pub persist: bool,
    /// Fields to project from remote reads. Empty means the whole document.
    pub source_fields: Vec<String>,
    /// Field used as the remote write key instead of `id_field`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write_key_field: Option<String>,
    /// Fill the cache on a remote hit from single-document `get`.
    pub fill_on_get: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            id_field: DEFAULT_ID_FIELD.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            persist: false,
            source_fields: Vec::new(),
            write_key_field: None,
            fill_on_get: false,
        }
    }
}

impl ReconcileConfig {
    /// Create a new reconcile config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_persist(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    pub fn with_source_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.source_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_write_key_field(mut self, field: impl Into<String>) -> Self {
        self.write_key_field = Some(field.into());
        self
    }

    pub fn with_fill_on_get(mut self, enabled: bool) -> Self {
        self.fill_on_get = enabled;
        self
    }

    /// Key accessor for the identifier field.
    pub fn key_field(&self) -> KeyField {
        KeyField::new(self.id_field.clone())
    }

    /// Key accessor for remote writes; falls back to the identifier field.
    pub fn write_key(&self) -> KeyField {
        KeyField::new(
            self.write_key_field
                .clone()
                .unwrap_or_else(|| self.id_field.clone()),
        )
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DocStateResult<()> {
        if self.id_field.trim().is_empty() {
            return Err(invalid("id_field", &self.id_field, "id_field must not be empty"));
        }

        if self.collection.trim().is_empty() {
            return Err(invalid(
                "collection",
                &self.collection,
                "collection must not be empty",
            ));
        }

        if self.chunk_size == 0 {
            return Err(invalid(
                "chunk_size",
                self.chunk_size,
                "chunk_size must be greater than 0",
            ));
        }

        if self.concurrency == 0 {
            return Err(invalid(
                "concurrency",
                self.concurrency,
                "concurrency must be greater than 0",
            ));
        }

        if let Some(field) = &self.write_key_field {
            if field.trim().is_empty() {
                return Err(invalid(
                    "write_key_field",
                    field,
                    "write_key_field must not be empty when set",
                ));
            }
        }

        Ok(())
    }
}

/// Complete store configuration as loaded from a file or the environment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub cache: CacheConfig,
    pub reconcile: ReconcileConfig,
}

impl StoreConfig {
    pub fn new(cache: CacheConfig, reconcile: ReconcileConfig) -> Self {
        Self { cache, reconcile }
    }

    /// Parse a TOML document.
    ///
    /// ```toml
    /// [cache]
    /// cache_size = 100000
    /// max_age_ms = 3600000
    ///
    /// [reconcile]
    /// index = "state"
    /// persist = true
    /// ```
    pub fn from_toml_str(source: &str) -> DocStateResult<Self> {
        let config: StoreConfig = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn from_path(path: impl AsRef<Path>) -> DocStateResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `DOCSTATE_CACHE_SIZE`: Cache capacity (default: 1000000)
    /// - `DOCSTATE_MAX_AGE_MS`: Entry max age in ms, `0` disables (default: 86400000)
    /// - `DOCSTATE_SAVE_DISPOSED`: Track disposed documents (default: false)
    /// - `DOCSTATE_ID_FIELD`: Identifier field for both layers (default: id)
    /// - `DOCSTATE_INDEX`: Remote collection (default: index)
    /// - `DOCSTATE_CHUNK_SIZE`: Remote chunk size (default: 2500)
    /// - `DOCSTATE_CONCURRENCY`: Chunk requests in flight (default: 100)
    /// - `DOCSTATE_PERSIST`: Mirror writes to the remote (default: false)
    /// - `DOCSTATE_SOURCE_FIELDS`: Comma-separated projection (default: none)
    /// - `DOCSTATE_WRITE_KEY_FIELD`: Remote write key field (default: id field)
    /// - `DOCSTATE_FILL_ON_GET`: Cache remote hits from `get` (default: false)
    pub fn from_env() -> Self {
        let cache_defaults = CacheConfig::default();
        let reconcile_defaults = ReconcileConfig::default();
        let id_field = std::env::var("DOCSTATE_ID_FIELD")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ID_FIELD.to_string());

        let cache = CacheConfig {
            capacity: env_parse("DOCSTATE_CACHE_SIZE").unwrap_or(cache_defaults.capacity),
            max_age: match env_parse::<u64>("DOCSTATE_MAX_AGE_MS") {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => cache_defaults.max_age,
            },
            track_disposed: env_parse("DOCSTATE_SAVE_DISPOSED")
                .unwrap_or(cache_defaults.track_disposed),
            id_field: id_field.clone(),
        };

        let reconcile = ReconcileConfig {
            id_field,
            collection: std::env::var("DOCSTATE_INDEX").unwrap_or(reconcile_defaults.collection),
            chunk_size: env_parse("DOCSTATE_CHUNK_SIZE").unwrap_or(reconcile_defaults.chunk_size),
            concurrency: env_parse("DOCSTATE_CONCURRENCY")
                .unwrap_or(reconcile_defaults.concurrency),
            persist: env_parse("DOCSTATE_PERSIST").unwrap_or(reconcile_defaults.persist),
            source_fields: std::env::var("DOCSTATE_SOURCE_FIELDS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            write_key_field: std::env::var("DOCSTATE_WRITE_KEY_FIELD")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            fill_on_get: env_parse("DOCSTATE_FILL_ON_GET")
                .unwrap_or(reconcile_defaults.fill_on_get),
        };

        Self { cache, reconcile }
    }

    /// Validate both sections and their agreement on the identifier field.
    pub fn validate(&self) -> DocStateResult<()> {
        self.cache.validate()?;
        self.reconcile.validate()?;

        if self.cache.id_field != self.reconcile.id_field {
            return Err(ConfigError::IncompatibleOptions {
                option_a: format!("cache.id_field={}", self.cache.id_field),
                option_b: format!("reconcile.id_field={}", self.reconcile.id_field),
            }
            .into());
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> crate::DocStateError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Optional durations stored as whole milliseconds; `0` reads as `None`.
mod duration_ms_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DocStateError;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.cache.capacity, 1_000_000);
        assert_eq!(config.cache.max_age, Some(Duration::from_secs(86_400)));
        assert!(!config.cache.track_disposed);
        assert_eq!(config.reconcile.collection, "index");
        assert_eq!(config.reconcile.chunk_size, 2500);
        assert_eq!(config.reconcile.concurrency, 100);
        assert!(!config.reconcile.persist);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let cache = CacheConfig::new()
            .with_capacity(10)
            .with_max_age(Duration::from_secs(5))
            .with_track_disposed(true)
            .with_id_field("uid");
        assert_eq!(cache.capacity, 10);
        assert_eq!(cache.max_age, Some(Duration::from_secs(5)));
        assert!(cache.track_disposed);
        assert_eq!(cache.key_field().name(), "uid");

        let reconcile = ReconcileConfig::new()
            .with_collection("state")
            .with_chunk_size(50)
            .with_concurrency(4)
            .with_persist(true)
            .with_source_fields(["a", "b"])
            .with_write_key_field("doc_id")
            .with_fill_on_get(true);
        assert_eq!(reconcile.collection, "state");
        assert_eq!(reconcile.chunk_size, 50);
        assert_eq!(reconcile.concurrency, 4);
        assert!(reconcile.persist);
        assert_eq!(reconcile.source_fields, vec!["a", "b"]);
        assert_eq!(reconcile.write_key().name(), "doc_id");
        assert!(reconcile.fill_on_get);
    }

    #[test]
    fn test_write_key_defaults_to_id_field() {
        let reconcile = ReconcileConfig::new().with_id_field("uid");
        assert_eq!(reconcile.write_key().name(), "uid");
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(CacheConfig::new().with_capacity(0).validate().is_err());
        assert!(CacheConfig::new()
            .with_max_age(Duration::ZERO)
            .validate()
            .is_err());
        assert!(ReconcileConfig::new().with_chunk_size(0).validate().is_err());
        assert!(ReconcileConfig::new().with_concurrency(0).validate().is_err());
        assert!(ReconcileConfig::new().with_collection(" ").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_mismatched_id_fields() {
        let config = StoreConfig::new(
            CacheConfig::new().with_id_field("a"),
            ReconcileConfig::new().with_id_field("b"),
        );
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            DocStateError::Config(ConfigError::IncompatibleOptions { .. })
        ));
    }

    #[test]
    fn test_from_toml_str() {
        let config = StoreConfig::from_toml_str(
            r#"
            [cache]
            cache_size = 500
            max_age_ms = 0
            save_disposed = true

            [reconcile]
            index = "state"
            chunk_size = 10
            persist = true
            source_fields = ["count"]
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.capacity, 500);
        assert_eq!(config.cache.max_age, None);
        assert!(config.cache.track_disposed);
        assert_eq!(config.reconcile.collection, "state");
        assert_eq!(config.reconcile.chunk_size, 10);
        assert_eq!(config.reconcile.concurrency, DEFAULT_CONCURRENCY);
        assert!(config.reconcile.persist);
        assert_eq!(config.reconcile.source_fields, vec!["count"]);
    }

    #[test]
    fn test_from_toml_str_rejects_unknown_and_invalid() {
        assert!(matches!(
            StoreConfig::from_toml_str("[cache]\nbogus = 1\n"),
            Err(DocStateError::Config(ConfigError::Parse { .. }))
        ));
        assert!(matches!(
            StoreConfig::from_toml_str("[reconcile]\nchunk_size = 0\n"),
            Err(DocStateError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docstate.toml");
        std::fs::write(&path, "[cache]\nmax_age_ms = 1500\n").unwrap();

        let config = StoreConfig::from_path(&path).unwrap();
        assert_eq!(config.cache.max_age, Some(Duration::from_millis(1500)));

        let missing = StoreConfig::from_path(dir.path().join("missing.toml"));
        assert!(matches!(
            missing,
            Err(DocStateError::Config(ConfigError::ReadFailed { .. }))
        ));
    }

    #[test]
    fn test_from_env_without_variables_matches_defaults() {
        // Only meaningful when no DOCSTATE_* variables are set in the test env.
        if std::env::vars().any(|(k, _)| k.starts_with("DOCSTATE_")) {
            return;
        }
        assert_eq!(StoreConfig::from_env(), StoreConfig::default());
    }
}
