//! Read-through, write-through reconciliation between the bounded cache and
//! a remote document service.
//!
//! Reads consult the cache first and only cache misses generate remote
//! traffic. Batch misses are split into chunks of `chunk_size` keys and at
//! most `concurrency` chunk requests are in flight at once. Found documents
//! are written back into the cache. With `persist` set, writes are mirrored to
//! the remote store and the caller waits for both.
//!
//! # Failure policy
//!
//! Remote errors are never retried. A failure in any chunk fails the whole
//! batch call with that error: no partial result is returned and no chunk of
//! the failed call fills the cache. A failed remote write leaves the cache
//! update in place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use docstate_core::{
    dedupe_by_key, CacheConfig, DocKey, DocStateResult, Document, KeyField, ReconcileConfig,
    StorageError, StoreConfig,
};
use futures_util::stream::{self, StreamExt, TryStreamExt};

use crate::cache::{BoundedKeyValueCache, CacheStats};
use crate::remote::{bulk_payload, BulkEntry, RemoteDocumentService, RemoteHit};

/// Bounded cache reconciled against a remote document service.
///
/// # Type Parameters
///
/// - `R`: The remote document service used on cache misses and for persisted
///   writes
///
/// # Example
///
/// ```ignore
/// let store = ReconcilingStore::new(
///     CacheConfig::new().with_capacity(100_000),
///     Arc::new(remote),
///     ReconcileConfig::new().with_collection("state").with_persist(true),
/// )?;
///
/// store.mset(&docs).await?;
/// let states = store.mget(&requests).await?;
/// ```
pub struct ReconcilingStore<R>
where
    R: RemoteDocumentService,
{
    /// The bounded cache. Never locked across an await point.
    cache: Mutex<BoundedKeyValueCache>,
    /// The remote system of record.
    remote: Arc<R>,
    /// Reconciliation configuration.
    config: ReconcileConfig,
    key_field: KeyField,
    write_key: KeyField,
}

impl<R> ReconcilingStore<R>
where
    R: RemoteDocumentService,
{
    /// Create a new reconciling store.
    ///
    /// Both configurations are validated and must agree on the identifier
    /// field.
    pub fn new(
        cache_config: CacheConfig,
        remote: Arc<R>,
        config: ReconcileConfig,
    ) -> DocStateResult<Self> {
        Self::from_config(StoreConfig::new(cache_config, config), remote)
    }

    /// Create a reconciling store from a loaded [`StoreConfig`].
    pub fn from_config(config: StoreConfig, remote: Arc<R>) -> DocStateResult<Self> {
        config.validate()?;
        let StoreConfig { cache, reconcile } = config;

        Ok(Self {
            cache: Mutex::new(BoundedKeyValueCache::new(cache)?),
            remote,
            key_field: reconcile.key_field(),
            write_key: reconcile.write_key(),
            config: reconcile,
        })
    }

    /// Get the reconcile configuration.
    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Get a reference to the remote service.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Accessor for the identifier field.
    pub fn key_field(&self) -> &KeyField {
        &self.key_field
    }

    fn with_cache<T>(&self, f: impl FnOnce(&mut BoundedKeyValueCache) -> T) -> DocStateResult<T> {
        let mut cache = self.cache.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&mut cache))
    }

    /// Keep the first document for each distinct key, in input order.
    pub fn dedupe<'a>(&self, docs: &'a [Document]) -> Vec<&'a Document> {
        dedupe_by_key(docs, &self.key_field)
            .into_iter()
            .map(|(_, doc)| doc)
            .collect()
    }

    /// Get the state for a document.
    ///
    /// A cache hit returns the cached document. A miss issues one remote
    /// point lookup and returns what the remote reports, with the identifier
    /// field attached. The cache is only filled from this path when
    /// `fill_on_get` is set. Documents without a key read as absent.
    pub async fn get(&self, doc: &Document) -> DocStateResult<Option<Document>> {
        let Some(key) = self.key_field.key_of(doc) else {
            return Ok(None);
        };

        if let Some(cached) = self.with_cache(|cache| cache.get(&key))? {
            return Ok(Some(cached));
        }

        let fetched = self
            .remote
            .fetch_one(&self.config.collection, &key)
            .await
            .inspect_err(|e| {
                tracing::warn!(error = %e, key = %key, "remote point lookup failed");
            })?;

        let Some(mut source) = fetched.into_document() else {
            return Ok(None);
        };
        self.key_field.attach(&mut source, &key);

        if self.config.fill_on_get {
            let filled = source.clone();
            self.with_cache(|cache| cache.set(key, filled))?;
        }

        Ok(Some(source))
    }

    /// Get the state for many documents, keyed by their identifier.
    ///
    /// Keys found neither in the cache nor remotely are absent from the
    /// result. Remote hits are written into the cache.
    pub async fn mget(&self, docs: &[Document]) -> DocStateResult<HashMap<DocKey, Document>> {
        let keys: Vec<DocKey> = dedupe_by_key(docs, &self.key_field)
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let (mut states, missing) = self.with_cache(|cache| {
            let mut states = HashMap::with_capacity(keys.len());
            let mut missing = Vec::new();
            for key in &keys {
                match cache.get(key) {
                    Some(doc) => {
                        states.insert(key.clone(), doc);
                    }
                    None => missing.push(key.clone()),
                }
            }
            (states, missing)
        })?;
        let cached = states.len();

        if missing.is_empty() {
            tracing::debug!(requested = keys.len(), cached, "mget served from cache");
            return Ok(states);
        }

        let resolved: Vec<(DocKey, Document)> = self
            .fetch_missing(&missing)
            .await?
            .into_iter()
            .filter(|hit| hit.found)
            .map(|hit| {
                let mut source = hit.source.unwrap_or_default();
                self.key_field.attach(&mut source, &hit.id);
                (hit.id, source)
            })
            .collect();
        let found = resolved.len();

        self.with_cache(|cache| {
            for (key, doc) in &resolved {
                tracing::trace!(key = %key, "cache fill from remote");
                cache.set(key.clone(), doc.clone());
            }
        })?;
        states.extend(resolved);

        tracing::debug!(
            requested = keys.len(),
            cached,
            fetched = missing.len(),
            found,
            "mget reconciled"
        );
        Ok(states)
    }

    async fn fetch_missing(&self, keys: &[DocKey]) -> DocStateResult<Vec<RemoteHit>> {
        let collection = self.config.collection.as_str();
        let source_fields = self.config.source_fields.as_slice();

        let chunks: Vec<Vec<RemoteHit>> = stream::iter(keys.chunks(self.config.chunk_size))
            .map(|chunk| self.remote.fetch_many(collection, chunk, source_fields))
            .buffer_unordered(self.config.concurrency)
            .try_collect()
            .await
            .inspect_err(|e| {
                tracing::warn!(error = %e, keys = keys.len(), "remote multi-get failed");
            })?;

        Ok(chunks.into_iter().flatten().collect())
    }

    /// Set the state for a document.
    ///
    /// The cache is always updated. With `persist`, the document is also
    /// written remotely under its write key and a remote failure is returned
    /// after the cache update has already happened.
    pub async fn set(&self, doc: &Document) -> DocStateResult<()> {
        if let Some(key) = self.key_field.key_of(doc) {
            self.with_cache(|cache| cache.set(key, doc.clone()))?;
        }

        if !self.config.persist {
            return Ok(());
        }

        let Some(write_id) = self.write_key.key_of(doc) else {
            return Ok(());
        };

        let payload = bulk_payload(&self.config.collection, [(write_id, doc)]);
        self.remote
            .bulk_write(&self.config.collection, payload)
            .await
            .inspect_err(|e| {
                tracing::warn!(error = %e, "remote write failed after cache update");
            })
    }

    /// Set the state for many documents.
    ///
    /// The first document per key wins. With `persist`, documents are also
    /// written remotely in bulk requests of at most `chunk_size` documents,
    /// deduplicated by the write key.
    pub async fn mset(&self, docs: &[Document]) -> DocStateResult<()> {
        let unique = dedupe_by_key(docs, &self.key_field);
        let cached = unique.len();
        self.with_cache(|cache| {
            for (key, doc) in unique {
                cache.set(key, doc.clone());
            }
        })?;

        if !self.config.persist {
            tracing::debug!(documents = docs.len(), cached, "mset cached");
            return Ok(());
        }

        let writes = dedupe_by_key(docs, &self.write_key);
        if writes.is_empty() {
            return Ok(());
        }

        let collection = self.config.collection.as_str();
        let payloads: Vec<Vec<BulkEntry>> = writes
            .chunks(self.config.chunk_size)
            .map(|chunk| bulk_payload(collection, chunk.iter().map(|(id, doc)| (id.clone(), *doc))))
            .collect();
        let chunks = payloads.len();

        stream::iter(payloads)
            .map(|payload| self.remote.bulk_write(collection, payload))
            .buffer_unordered(self.config.concurrency)
            .try_collect::<Vec<()>>()
            .await
            .inspect_err(|e| {
                tracing::warn!(error = %e, documents = writes.len(), "remote bulk write failed");
            })?;

        tracing::debug!(
            documents = docs.len(),
            cached,
            persisted = writes.len(),
            chunks,
            "mset persisted"
        );
        Ok(())
    }

    /// Remove a document from the cache. The remote store is untouched.
    pub fn delete(&self, doc: &Document) -> DocStateResult<()> {
        match self.key_field.key_of(doc) {
            Some(key) => self.with_cache(|cache| cache.delete(&key)),
            None => Ok(()),
        }
    }

    /// Remove many documents from the cache.
    pub fn mdelete(&self, docs: &[Document]) -> DocStateResult<()> {
        let keys: Vec<DocKey> = docs.iter().filter_map(|d| self.key_field.key_of(d)).collect();
        self.with_cache(|cache| cache.mdelete(&keys))
    }

    /// Whether the cache holds a live entry for the document.
    pub fn has(&self, doc: &Document) -> DocStateResult<bool> {
        match self.key_field.key_of(doc) {
            Some(key) => self.with_cache(|cache| cache.has(&key)),
            None => Ok(false),
        }
    }

    /// Number of live cache entries.
    pub fn count(&self) -> DocStateResult<usize> {
        self.with_cache(|cache| cache.count())
    }

    /// Return and clear documents disposed by the cache.
    pub fn take_disposed(&self) -> DocStateResult<Vec<Document>> {
        self.with_cache(|cache| cache.take_disposed())
    }

    /// Snapshot of cache statistics.
    pub fn stats(&self) -> DocStateResult<CacheStats> {
        self.with_cache(|cache| cache.stats())
    }
}
