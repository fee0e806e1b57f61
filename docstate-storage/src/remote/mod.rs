//! Remote document service seam.
//!
//! The reconciling store only talks to the system of record through
//! [`RemoteDocumentService`], so any transport (or a test double) can sit
//! behind it.

use async_trait::async_trait;
use docstate_core::{DocKey, DocStateResult, Document};

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;

#[cfg(feature = "elasticsearch")]
pub use elasticsearch::{ElasticsearchError, ElasticsearchService};

/// Result of a point lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOne {
    pub found: bool,
    pub source: Option<Document>,
}

impl FetchOne {
    pub fn found(source: Document) -> Self {
        Self {
            found: true,
            source: Some(source),
        }
    }

    pub fn missing() -> Self {
        Self {
            found: false,
            source: None,
        }
    }

    /// The document, if the remote reported it as found.
    pub fn into_document(self) -> Option<Document> {
        if self.found {
            self.source
        } else {
            None
        }
    }
}

/// One entry of a multi-get response.
///
/// Responses may arrive in any order; callers key them by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteHit {
    pub id: DocKey,
    pub found: bool,
    pub source: Option<Document>,
}

impl RemoteHit {
    pub fn found(id: DocKey, source: Document) -> Self {
        Self {
            id,
            found: true,
            source: Some(source),
        }
    }

    pub fn missing(id: DocKey) -> Self {
        Self {
            id,
            found: false,
            source: None,
        }
    }
}

/// Write instruction paired with the document that follows it in a bulk payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInstruction {
    pub collection: String,
    pub id: DocKey,
}

/// One line of a bulk payload.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkEntry {
    Instruction(IndexInstruction),
    Document(Document),
}

/// Build an interleaved bulk payload: one instruction followed by its
/// document, per pair, in input order.
pub fn bulk_payload<'a, I>(collection: &str, docs: I) -> Vec<BulkEntry>
where
    I: IntoIterator<Item = (DocKey, &'a Document)>,
{
    docs.into_iter()
        .flat_map(|(id, doc)| {
            [
                BulkEntry::Instruction(IndexInstruction {
                    collection: collection.to_string(),
                    id,
                }),
                BulkEntry::Document(doc.clone()),
            ]
        })
        .collect()
}

/// Remote key-value document service.
#[async_trait]
pub trait RemoteDocumentService: Send + Sync {
    /// Point lookup by key.
    async fn fetch_one(&self, collection: &str, id: &DocKey) -> DocStateResult<FetchOne>;

    /// Multi-get by keys, optionally projecting `source_fields`.
    ///
    /// An empty projection returns whole documents.
    async fn fetch_many(
        &self,
        collection: &str,
        ids: &[DocKey],
        source_fields: &[String],
    ) -> DocStateResult<Vec<RemoteHit>>;

    /// Apply one index write per instruction/document pair.
    async fn bulk_write(&self, collection: &str, entries: Vec<BulkEntry>) -> DocStateResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bulk_payload_interleaves_pairs() {
        let a = json!({"id": "1", "v": 1}).as_object().cloned().unwrap();
        let b = json!({"id": "2", "v": 2}).as_object().cloned().unwrap();

        let payload = bulk_payload(
            "state",
            vec![(DocKey::from("1"), &a), (DocKey::from("2"), &b)],
        );

        assert_eq!(payload.len(), 4);
        assert_eq!(
            payload[0],
            BulkEntry::Instruction(IndexInstruction {
                collection: "state".to_string(),
                id: DocKey::from("1"),
            })
        );
        assert_eq!(payload[1], BulkEntry::Document(a));
        assert!(matches!(payload[2], BulkEntry::Instruction(_)));
        assert_eq!(payload[3], BulkEntry::Document(b));
    }

    #[test]
    fn test_fetch_one_into_document() {
        let d = json!({"id": 1}).as_object().cloned().unwrap();
        assert_eq!(FetchOne::found(d.clone()).into_document(), Some(d.clone()));
        assert_eq!(FetchOne::missing().into_document(), None);

        let inconsistent = FetchOne {
            found: false,
            source: Some(d),
        };
        assert_eq!(inconsistent.into_document(), None);
    }
}
