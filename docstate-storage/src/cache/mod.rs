//! Bounded in-memory document cache.
//!
//! [`BoundedKeyValueCache`] is the synchronous leaf layer: a fixed-capacity
//! LRU map from [`DocKey`](docstate_core::DocKey) to document with optional
//! per-entry max age and an explicit drain for disposed documents. It never
//! fails once constructed; the reconciling store wraps it behind a lock.

pub mod bounded;
pub mod stats;

pub use bounded::BoundedKeyValueCache;
pub use stats::CacheStats;
