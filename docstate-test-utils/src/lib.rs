//! DocState Test Utilities
//!
//! Shared test infrastructure for the DocState workspace:
//! - An in-memory remote document service with call recording and fault injection
//! - Proptest generators for keys and documents
//! - Test fixtures for common scenarios
//! - Custom assertions for DocState errors

pub use docstate_core::{
    CacheConfig, ConfigError, DocKey, DocStateError, DocStateResult, Document, KeyField,
    ReconcileConfig, RemoteOperation, StorageError, StoreConfig,
};
pub use docstate_storage::{
    BoundedKeyValueCache, BulkEntry, FetchOne, IndexInstruction, ReconcilingStore,
    RemoteDocumentService, RemoteHit,
};

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

// ============================================================================
// MOCK REMOTE SERVICE
// ============================================================================

/// In-memory remote document service for testing.
///
/// Bulk writes are applied to the backing map, so persisted documents can be
/// read back. Every call is recorded for inspection.
#[derive(Debug, Default)]
pub struct MockDocumentService {
    docs: Mutex<HashMap<DocKey, Document>>,
    fetch_one_calls: AtomicUsize,
    fetch_many_calls: Mutex<Vec<Vec<DocKey>>>,
    source_fields_seen: Mutex<Vec<Vec<String>>>,
    bulk_requests: Mutex<Vec<Vec<BulkEntry>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Option<Duration>,
    fail_reads: bool,
    fail_writes: bool,
    poison_key: Option<DocKey>,
    strip_field: Option<String>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockDocumentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the remote store.
    pub fn with_documents<I>(self, docs: I) -> Self
    where
        I: IntoIterator<Item = (DocKey, Document)>,
    {
        lock(&self.docs).extend(docs);
        self
    }

    /// Delay every call, so concurrent calls overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail every point lookup and multi-get.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Fail every bulk write.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Fail any multi-get whose chunk contains `key`.
    pub fn with_poison_key(mut self, key: impl Into<DocKey>) -> Self {
        self.poison_key = Some(key.into());
        self
    }

    /// Remove `field` from every returned source.
    pub fn stripping_field(mut self, field: impl Into<String>) -> Self {
        self.strip_field = Some(field.into());
        self
    }

    pub fn fetch_one_calls(&self) -> usize {
        self.fetch_one_calls.load(Ordering::SeqCst)
    }

    /// Key lists of every multi-get, in call order.
    pub fn fetch_many_calls(&self) -> Vec<Vec<DocKey>> {
        lock(&self.fetch_many_calls).clone()
    }

    /// Projection passed with every multi-get, in call order.
    pub fn requested_source_fields(&self) -> Vec<Vec<String>> {
        lock(&self.source_fields_seen).clone()
    }

    /// Payloads of every bulk write, in call order.
    pub fn bulk_requests(&self) -> Vec<Vec<BulkEntry>> {
        lock(&self.bulk_requests).clone()
    }

    /// Highest number of calls observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Document currently stored under `key`.
    pub fn stored(&self, key: &DocKey) -> Option<Document> {
        lock(&self.docs).get(key).cloned()
    }

    pub fn stored_count(&self) -> usize {
        lock(&self.docs).len()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn project(&self, doc: &Document, source_fields: &[String]) -> Document {
        let mut source: Document = if source_fields.is_empty() {
            doc.clone()
        } else {
            doc.iter()
                .filter(|(field, _)| source_fields.contains(field))
                .map(|(field, value)| (field.clone(), value.clone()))
                .collect()
        };
        if let Some(field) = &self.strip_field {
            source.remove(field);
        }
        source
    }

    fn unavailable(operation: RemoteOperation, reason: &str) -> DocStateError {
        StorageError::RemoteUnavailable {
            operation,
            reason: reason.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl RemoteDocumentService for MockDocumentService {
    async fn fetch_one(&self, _collection: &str, id: &DocKey) -> DocStateResult<FetchOne> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        self.fetch_one_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        if self.fail_reads {
            return Err(Self::unavailable(RemoteOperation::FetchOne, "injected failure"));
        }

        Ok(match lock(&self.docs).get(id) {
            Some(doc) => FetchOne::found(self.project(doc, &[])),
            None => FetchOne::missing(),
        })
    }

    async fn fetch_many(
        &self,
        _collection: &str,
        ids: &[DocKey],
        source_fields: &[String],
    ) -> DocStateResult<Vec<RemoteHit>> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        lock(&self.fetch_many_calls).push(ids.to_vec());
        lock(&self.source_fields_seen).push(source_fields.to_vec());
        self.pause().await;

        if self.fail_reads {
            return Err(Self::unavailable(RemoteOperation::FetchMany, "injected failure"));
        }
        if let Some(poison) = &self.poison_key {
            if ids.contains(poison) {
                return Err(Self::unavailable(
                    RemoteOperation::FetchMany,
                    &format!("poisoned key {poison}"),
                ));
            }
        }

        let docs = lock(&self.docs);
        Ok(ids
            .iter()
            .map(|id| match docs.get(id) {
                Some(doc) => RemoteHit::found(id.clone(), self.project(doc, source_fields)),
                None => RemoteHit::missing(id.clone()),
            })
            .collect())
    }

    async fn bulk_write(&self, collection: &str, entries: Vec<BulkEntry>) -> DocStateResult<()> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        lock(&self.bulk_requests).push(entries.clone());
        self.pause().await;

        if self.fail_writes {
            return Err(StorageError::RemoteRejected {
                collection: collection.to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }

        let mut docs = lock(&self.docs);
        let mut pending = None;
        for entry in entries {
            match entry {
                BulkEntry::Instruction(instruction) => pending = Some(instruction.id),
                BulkEntry::Document(doc) => {
                    if let Some(id) = pending.take() {
                        docs.insert(id, doc);
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating DocState keys and documents.

    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    /// Generate a string or numeric key.
    pub fn arb_doc_key() -> impl Strategy<Value = DocKey> {
        prop_oneof![
            "[a-z0-9]{1,8}".prop_map(DocKey::from),
            (0u64..10_000).prop_map(DocKey::from),
        ]
    }

    /// Generate a small JSON payload value.
    pub fn arb_payload() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(Value::from),
            "[a-zA-Z ]{0,16}".prop_map(Value::String),
        ]
    }

    /// Generate a document carrying `key` in the default identifier field.
    pub fn arb_document_for(key: DocKey) -> impl Strategy<Value = Document> {
        arb_payload().prop_map(move |data| {
            let mut doc = Document::new();
            KeyField::default().attach(&mut doc, &key);
            doc.insert("data".to_string(), data);
            doc
        })
    }

    /// Generate a keyed document.
    pub fn arb_document() -> impl Strategy<Value = Document> {
        arb_doc_key().prop_flat_map(arb_document_for)
    }

    /// Generate a batch of documents drawn from a small key space, so
    /// duplicates are common.
    pub fn arb_documents(max_len: usize) -> impl Strategy<Value = Vec<Document>> {
        prop::collection::vec(
            (0u64..64).prop_flat_map(|n| arb_document_for(DocKey::from(n))),
            0..max_len,
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built documents and configurations for common testing scenarios.

    use super::*;
    use serde_json::{json, Value};
    use std::ops::Range;

    /// Build a document `{id, data}`.
    pub fn document(id: impl Into<DocKey>, data: Value) -> Document {
        let mut doc = Document::new();
        KeyField::default().attach(&mut doc, &id.into());
        doc.insert("data".to_string(), data);
        doc
    }

    /// Build a request document carrying only the identifier.
    pub fn request(id: impl Into<DocKey>) -> Document {
        let mut doc = Document::new();
        KeyField::default().attach(&mut doc, &id.into());
        doc
    }

    /// Documents with numeric ids over `range`, each with `data = "v<id>"`.
    pub fn documents(range: Range<u64>) -> Vec<Document> {
        range.map(|n| document(n, json!(format!("v{n}")))).collect()
    }

    /// Request documents with numeric ids over `range`.
    pub fn requests(range: Range<u64>) -> Vec<Document> {
        range.map(request).collect()
    }

    /// Keyed pairs for seeding [`MockDocumentService`].
    pub fn seed(docs: &[Document]) -> Vec<(DocKey, Document)> {
        let key_field = KeyField::default();
        docs.iter()
            .filter_map(|doc| key_field.key_of(doc).map(|key| (key, doc.clone())))
            .collect()
    }

    /// Cache configuration large enough for any test batch.
    pub fn roomy_cache() -> CacheConfig {
        CacheConfig::new().with_capacity(100_000)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for DocState results.

    use super::*;

    /// Assert that a DocStateResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &DocStateResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a DocStateResult is a Storage error.
    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &DocStateResult<T>) {
        match result {
            Err(DocStateError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    /// Assert that a DocStateResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &DocStateResult<T>) {
        match result {
            Err(DocStateError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a DocStateResult failed because the remote was unavailable
    /// during `operation`.
    #[track_caller]
    pub fn assert_remote_unavailable<T: std::fmt::Debug>(
        result: &DocStateResult<T>,
        operation: RemoteOperation,
    ) {
        match result {
            Err(DocStateError::Storage(StorageError::RemoteUnavailable { operation: op, .. })) => {
                assert_eq!(*op, operation, "Wrong operation in RemoteUnavailable error");
            }
            other => panic!("Expected RemoteUnavailable for {}, got: {:?}", operation, other),
        }
    }

    /// Assert that a bulk payload alternates instruction and document lines.
    #[track_caller]
    pub fn assert_interleaved(payload: &[BulkEntry]) {
        assert_eq!(payload.len() % 2, 0, "Bulk payload has an unpaired entry");
        for (i, pair) in payload.chunks(2).enumerate() {
            assert!(
                matches!(pair, [BulkEntry::Instruction(_), BulkEntry::Document(_)]),
                "Bulk pair {} is not instruction then document: {:?}",
                i,
                pair
            );
        }
    }
}
