//! Fixed-capacity, possibly-expiring key to document store with LRU eviction.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use docstate_core::{CacheConfig, DocKey, DocStateResult, Document, KeyField};
use lru::LruCache;

use super::stats::CacheStats;

#[derive(Debug, Clone)]
struct CacheEntry {
    doc: Document,
    inserted_at: Instant,
}

impl CacheEntry {
    fn new(doc: Document) -> Self {
        Self {
            doc,
            inserted_at: Instant::now(),
        }
    }

    fn is_expired(&self, max_age: Option<Duration>) -> bool {
        max_age.is_some_and(|age| self.inserted_at.elapsed() > age)
    }
}

/// Bounded LRU cache of documents keyed by their identifier field.
///
/// Recency is refreshed by [`get`](Self::get), [`mget`](Self::mget) and
/// [`set`](Self::set). [`has`](Self::has) does not touch recency. Entries older
/// than the configured max age read as absent and are purged on access.
///
/// With `track_disposed` enabled, every document leaving the cache through
/// eviction, expiry or [`delete`](Self::delete) is kept until
/// [`take_disposed`](Self::take_disposed) drains it.
///
/// # Example
///
/// ```
/// use docstate_core::{CacheConfig, DocKey};
/// use docstate_storage::BoundedKeyValueCache;
/// use serde_json::json;
///
/// let mut cache = BoundedKeyValueCache::new(CacheConfig::new().with_capacity(2)).unwrap();
/// let doc = json!({"id": 1, "data": "x"}).as_object().cloned().unwrap();
/// cache.set(DocKey::from(1i64), doc.clone());
///
/// assert_eq!(cache.count(), 1);
/// assert_eq!(cache.get(&DocKey::from(1i64)), Some(doc));
/// ```
pub struct BoundedKeyValueCache {
    entries: LruCache<DocKey, CacheEntry>,
    capacity: usize,
    max_age: Option<Duration>,
    key_field: KeyField,
    track_disposed: bool,
    disposed: Vec<Document>,
    stats: CacheStats,
}

impl BoundedKeyValueCache {
    /// Create a cache from a validated configuration.
    pub fn new(config: CacheConfig) -> DocStateResult<Self> {
        config.validate()?;

        Ok(Self {
            // Capacity is enforced in `set`.
            entries: LruCache::unbounded(),
            capacity: config.capacity,
            max_age: config.max_age,
            key_field: config.key_field(),
            track_disposed: config.track_disposed,
            disposed: Vec::new(),
            stats: CacheStats::default(),
        })
    }

    /// Create a cache with default configuration.
    pub fn with_defaults() -> DocStateResult<Self> {
        Self::new(CacheConfig::default())
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Accessor for the identifier field used by [`mset`](Self::mset).
    pub fn key_field(&self) -> &KeyField {
        &self.key_field
    }

    /// Extract the cache key of a document.
    pub fn key_of(&self, doc: &Document) -> Option<DocKey> {
        self.key_field.key_of(doc)
    }

    /// Get a document, refreshing its recency.
    pub fn get(&mut self, key: &DocKey) -> Option<Document> {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.is_expired(self.max_age),
            None => {
                self.stats.misses += 1;
                return None;
            }
        };

        if expired {
            self.expire(key);
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        self.entries.get(key).map(|entry| entry.doc.clone())
    }

    /// Get every present document among `keys`. Absent keys are omitted.
    pub fn mget(&mut self, keys: &[DocKey]) -> HashMap<DocKey, Document> {
        keys.iter()
            .filter_map(|key| self.get(key).map(|doc| (key.clone(), doc)))
            .collect()
    }

    /// Insert or overwrite a document.
    ///
    /// A new key at capacity evicts the least recently used entry first.
    pub fn set(&mut self, key: DocKey, doc: Document) {
        if !self.entries.contains(&key) && self.entries.len() >= self.capacity {
            if let Some((evicted_key, evicted)) = self.entries.pop_lru() {
                if evicted.is_expired(self.max_age) {
                    self.stats.expirations += 1;
                } else {
                    self.stats.evictions += 1;
                }
                tracing::trace!(key = %evicted_key, "evicted least recently used document");
                self.dispose(evicted.doc);
            }
        }

        self.entries.put(key, CacheEntry::new(doc));
    }

    /// Insert documents in order, keyed by the identifier field.
    ///
    /// Later duplicates overwrite earlier ones. Documents without a key are
    /// skipped.
    pub fn mset<I>(&mut self, docs: I)
    where
        I: IntoIterator<Item = Document>,
    {
        for doc in docs {
            if let Some(key) = self.key_field.key_of(&doc) {
                self.set(key, doc);
            }
        }
    }

    /// Remove a document if present.
    pub fn delete(&mut self, key: &DocKey) {
        if let Some(entry) = self.entries.pop(key) {
            self.dispose(entry.doc);
        }
    }

    /// Remove every present document among `keys`.
    pub fn mdelete(&mut self, keys: &[DocKey]) {
        for key in keys {
            self.delete(key);
        }
    }

    /// Whether a live entry exists for `key`. Does not refresh recency.
    pub fn has(&mut self, key: &DocKey) -> bool {
        let expired = match self.entries.peek(key) {
            Some(entry) => entry.is_expired(self.max_age),
            None => return false,
        };

        if expired {
            self.expire(key);
        }
        !expired
    }

    /// Number of live entries.
    ///
    /// With a max age configured, expired entries are purged first, which
    /// walks every entry. Without one this is O(1).
    pub fn count(&mut self) -> usize {
        self.prune();
        self.entries.len()
    }

    /// Purge every expired entry, returning how many were removed.
    pub fn prune(&mut self) -> usize {
        if self.max_age.is_none() {
            return 0;
        }

        let expired: Vec<DocKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(self.max_age))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            self.expire(key);
        }
        expired.len()
    }

    /// Return and clear the documents disposed since the last call.
    pub fn take_disposed(&mut self) -> Vec<Document> {
        std::mem::take(&mut self.disposed)
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len() as u64,
            ..self.stats.clone()
        }
    }

    fn expire(&mut self, key: &DocKey) {
        if let Some(entry) = self.entries.pop(key) {
            self.stats.expirations += 1;
            self.dispose(entry.doc);
        }
    }

    fn dispose(&mut self, doc: Document) {
        if self.track_disposed {
            self.disposed.push(doc);
        }
    }
}

impl std::fmt::Debug for BoundedKeyValueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedKeyValueCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("max_age", &self.max_age)
            .field("key_field", &self.key_field)
            .field("track_disposed", &self.track_disposed)
            .finish()
    }
}
