//! DocState Storage Layer
//!
//! A bounded LRU document cache and a store that reconciles it against a
//! remote document service.
//!
//! # Components
//!
//! - [`BoundedKeyValueCache`]: capacity bound, LRU eviction, optional max age,
//!   and an optional feed of disposed documents
//! - [`ReconcilingStore`]: read-through and write-through access to a
//!   [`RemoteDocumentService`] with chunked, concurrency-limited batches
//! - [`ElasticsearchService`]: HTTP transport for Elasticsearch-compatible
//!   document stores (feature `elasticsearch`)

pub mod cache;
pub mod reconcile;
pub mod remote;

pub use cache::{BoundedKeyValueCache, CacheStats};
pub use reconcile::ReconcilingStore;
pub use remote::{
    bulk_payload, BulkEntry, FetchOne, IndexInstruction, RemoteDocumentService, RemoteHit,
};

#[cfg(feature = "elasticsearch")]
pub use remote::{ElasticsearchError, ElasticsearchService};
