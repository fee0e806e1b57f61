//! Elasticsearch-compatible transport for [`RemoteDocumentService`].
//!
//! Uses three endpoints:
//! - `GET /{collection}/_doc/{id}` for point lookups
//! - `POST /{collection}/_mget` with `_source_includes` for projected multi-gets
//! - `POST /_bulk` with an NDJSON body for index writes
//!
//! Document ids travel as strings. Multi-get results are mapped back to the
//! requested [`DocKey`] so numeric keys keep their type. Keys sharing the same
//! text (`1` and `"1"`) are matched to response items in request order, which
//! is the order the server answers in.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use docstate_core::{ConfigError, DocKey, DocStateResult, Document, RemoteOperation, StorageError};
use reqwest::{Client, StatusCode, Url};
use serde_json::{json, Value};

use super::{BulkEntry, FetchOne, RemoteDocumentService, RemoteHit};

/// Error type for Elasticsearch transport operations.
#[derive(Debug, thiserror::Error)]
pub enum ElasticsearchError {
    /// The configured base URL cannot carry a path.
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),

    /// The request never produced a response.
    #[error("HTTP request for {operation} failed: {source}")]
    Http {
        operation: RemoteOperation,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("Unexpected status {status} from {operation}: {body}")]
    Status {
        operation: RemoteOperation,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("Malformed response from {operation}: {reason}")]
    Malformed {
        operation: RemoteOperation,
        reason: String,
    },

    /// The bulk request was accepted but some items failed.
    #[error("Bulk write to {collection} reported item failures: {reason}")]
    BulkFailed { collection: String, reason: String },
}

/// Convert ElasticsearchError to DocStateError.
impl From<ElasticsearchError> for docstate_core::DocStateError {
    fn from(e: ElasticsearchError) -> Self {
        let storage = match e {
            ElasticsearchError::InvalidUrl(value) => {
                return ConfigError::InvalidValue {
                    field: "base_url".to_string(),
                    value,
                    reason: "must be an absolute http(s) URL".to_string(),
                }
                .into();
            }
            ElasticsearchError::Http { operation, source } => StorageError::RemoteUnavailable {
                operation,
                reason: source.to_string(),
            },
            ElasticsearchError::Status {
                operation,
                status,
                body,
            } => StorageError::RemoteUnavailable {
                operation,
                reason: format!("status {}: {}", status, body),
            },
            ElasticsearchError::Malformed { operation, reason } => {
                StorageError::InvalidResponse { operation, reason }
            }
            ElasticsearchError::BulkFailed { collection, reason } => {
                StorageError::RemoteRejected { collection, reason }
            }
        };
        storage.into()
    }
}

/// HTTP client for an Elasticsearch-compatible document service.
///
/// # Example
///
/// ```ignore
/// let remote = Arc::new(ElasticsearchService::new("http://localhost:9200")?);
/// let store = ReconcilingStore::new(CacheConfig::default(), remote, ReconcileConfig::default())?;
/// ```
#[derive(Debug, Clone)]
pub struct ElasticsearchService {
    client: Client,
    base: Url,
}

impl ElasticsearchService {
    /// Create a service with a default HTTP client.
    pub fn new(base_url: &str) -> Result<Self, ElasticsearchError> {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a service around an existing HTTP client (timeouts, TLS, auth).
    pub fn with_client(client: Client, base_url: &str) -> Result<Self, ElasticsearchError> {
        let base = Url::parse(base_url).map_err(|e| ElasticsearchError::InvalidUrl(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ElasticsearchError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ElasticsearchError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ElasticsearchError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_doc(&self, collection: &str, id: &DocKey) -> Result<FetchOne, ElasticsearchError> {
        let operation = RemoteOperation::FetchOne;
        let url = self.endpoint(&[collection, "_doc", &id.to_string()])?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ElasticsearchError::Http { operation, source })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(FetchOne::missing());
        }

        let body = read_json(response, operation).await?;
        parse_get_response(&body)
    }

    async fn mget_docs(
        &self,
        collection: &str,
        ids: &[DocKey],
        source_fields: &[String],
    ) -> Result<Vec<RemoteHit>, ElasticsearchError> {
        let operation = RemoteOperation::FetchMany;
        let mut url = self.endpoint(&[collection, "_mget"])?;
        if !source_fields.is_empty() {
            url.query_pairs_mut()
                .append_pair("_source_includes", &source_fields.join(","));
        }

        let ids_body: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let response = self
            .client
            .post(url)
            .json(&json!({ "ids": ids_body }))
            .send()
            .await
            .map_err(|source| ElasticsearchError::Http { operation, source })?;

        let body = read_json(response, operation).await?;
        parse_mget_response(&body, ids)
    }

    async fn bulk(&self, collection: &str, entries: &[BulkEntry]) -> Result<(), ElasticsearchError> {
        let operation = RemoteOperation::BulkWrite;
        let url = self.endpoint(&["_bulk"])?;
        let response = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_body(entries))
            .send()
            .await
            .map_err(|source| ElasticsearchError::Http { operation, source })?;

        let body = read_json(response, operation).await?;
        parse_bulk_response(collection, &body)
    }
}

#[async_trait]
impl RemoteDocumentService for ElasticsearchService {
    async fn fetch_one(&self, collection: &str, id: &DocKey) -> DocStateResult<FetchOne> {
        Ok(self.get_doc(collection, id).await?)
    }

    async fn fetch_many(
        &self,
        collection: &str,
        ids: &[DocKey],
        source_fields: &[String],
    ) -> DocStateResult<Vec<RemoteHit>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.mget_docs(collection, ids, source_fields).await?)
    }

    async fn bulk_write(&self, collection: &str, entries: Vec<BulkEntry>) -> DocStateResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        Ok(self.bulk(collection, &entries).await?)
    }
}

async fn read_json(
    response: reqwest::Response,
    operation: RemoteOperation,
) -> Result<Value, ElasticsearchError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ElasticsearchError::Status {
            operation,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<Value>()
        .await
        .map_err(|e| ElasticsearchError::Malformed {
            operation,
            reason: e.to_string(),
        })
}

fn parse_get_response(body: &Value) -> Result<FetchOne, ElasticsearchError> {
    let found = body
        .get("found")
        .and_then(Value::as_bool)
        .ok_or_else(|| ElasticsearchError::Malformed {
            operation: RemoteOperation::FetchOne,
            reason: "missing `found` flag".to_string(),
        })?;

    if !found {
        return Ok(FetchOne::missing());
    }

    let source = body
        .get("_source")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Ok(FetchOne::found(source))
}

fn parse_mget_response(body: &Value, requested: &[DocKey]) -> Result<Vec<RemoteHit>, ElasticsearchError> {
    let operation = RemoteOperation::FetchMany;
    let docs = body
        .get("docs")
        .and_then(Value::as_array)
        .ok_or_else(|| ElasticsearchError::Malformed {
            operation,
            reason: "missing `docs` array".to_string(),
        })?;

    let mut by_text: HashMap<String, VecDeque<&DocKey>> = HashMap::new();
    for key in requested {
        by_text.entry(key.to_string()).or_default().push_back(key);
    }

    docs.iter()
        .map(|doc| {
            let raw_id = doc.get("_id").and_then(Value::as_str).ok_or_else(|| {
                ElasticsearchError::Malformed {
                    operation,
                    reason: "document without `_id`".to_string(),
                }
            })?;

            if let Some(error) = doc.get("error") {
                return Err(ElasticsearchError::Malformed {
                    operation,
                    reason: format!("item {} failed: {}", raw_id, error),
                });
            }

            let id = by_text
                .get_mut(raw_id)
                .and_then(VecDeque::pop_front)
                .cloned()
                .unwrap_or_else(|| DocKey::Str(raw_id.to_string()));

            let found = doc.get("found").and_then(Value::as_bool).unwrap_or(false);
            if !found {
                return Ok(RemoteHit::missing(id));
            }

            let source: Document = doc
                .get("_source")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            Ok(RemoteHit::found(id, source))
        })
        .collect()
}

fn bulk_body(entries: &[BulkEntry]) -> String {
    let mut body = String::new();
    for entry in entries {
        let line = match entry {
            BulkEntry::Instruction(instruction) => json!({
                "index": {
                    "_index": instruction.collection,
                    "_id": instruction.id.to_string(),
                }
            }),
            BulkEntry::Document(doc) => Value::Object(doc.clone()),
        };
        body.push_str(&line.to_string());
        body.push('\n');
    }
    body
}

fn parse_bulk_response(collection: &str, body: &Value) -> Result<(), ElasticsearchError> {
    let errors = body
        .get("errors")
        .and_then(Value::as_bool)
        .ok_or_else(|| ElasticsearchError::Malformed {
            operation: RemoteOperation::BulkWrite,
            reason: "missing `errors` flag".to_string(),
        })?;

    if !errors {
        return Ok(());
    }

    let items = body.get("items").and_then(Value::as_array);
    let failed: Vec<&Value> = items
        .into_iter()
        .flatten()
        .filter_map(|item| item.as_object().and_then(|o| o.values().next()))
        .filter(|result| result.get("error").is_some())
        .collect();

    let reason = match failed.first() {
        Some(first) => format!(
            "{} item(s) failed, first: {}",
            failed.len(),
            first.get("error").map(Value::to_string).unwrap_or_default()
        ),
        None => "errors flag set without item details".to_string(),
    };

    Err(ElasticsearchError::BulkFailed {
        collection: collection.to_string(),
        reason,
    })
}
