//! HTTP tests for the Elasticsearch transport against a mock server.
//!
//! Covers:
//! - Point lookups, including 404 as a missing document
//! - Multi-get body, projection query and key restoration
//! - NDJSON bulk requests and item failures
//! - Status and body errors mapped into DocState errors

#![cfg(feature = "elasticsearch")]

use docstate_core::{DocKey, DocStateError, Document, RemoteOperation, StorageError};
use docstate_storage::{bulk_payload, ElasticsearchService, FetchOne, RemoteDocumentService, RemoteHit};
use docstate_test_utils::assertions::assert_remote_unavailable;
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

/// Parse an NDJSON body, requiring a trailing newline.
fn ndjson_lines(body: &[u8]) -> Vec<Value> {
    let text = std::str::from_utf8(body).unwrap_or_default();
    if !text.ends_with('\n') {
        return Vec::new();
    }
    text.lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect()
}

async fn service() -> (MockServer, ElasticsearchService) {
    let server = MockServer::start().await;
    let service = ElasticsearchService::new(&server.uri()).unwrap();
    (server, service)
}

// ============================================================================
// POINT LOOKUP
// ============================================================================

#[tokio::test]
async fn test_fetch_one_found() {
    let (server, service) = service().await;
    Mock::given(method("GET"))
        .and(path("/state/_doc/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_index": "state", "_id": "7", "found": true, "_source": {"data": "x"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = service.fetch_one("state", &DocKey::from(7i64)).await.unwrap();
    assert_eq!(result, FetchOne::found(doc(json!({"data": "x"}))));
}

#[tokio::test]
async fn test_fetch_one_not_found_status_is_missing() {
    let (server, service) = service().await;
    Mock::given(method("GET"))
        .and(path("/state/_doc/absent"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "_index": "state", "_id": "absent", "found": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = service.fetch_one("state", &DocKey::from("absent")).await.unwrap();
    assert_eq!(result, FetchOne::missing());
}

#[tokio::test]
async fn test_fetch_one_server_error_is_unavailable() {
    let (server, service) = service().await;
    Mock::given(method("GET"))
        .and(path("/state/_doc/1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("shard failure"))
        .mount(&server)
        .await;

    let result = service.fetch_one("state", &DocKey::from("1")).await;
    assert_remote_unavailable(&result, RemoteOperation::FetchOne);
    match result {
        Err(DocStateError::Storage(StorageError::RemoteUnavailable { reason, .. })) => {
            assert!(reason.contains("500"));
            assert!(reason.contains("shard failure"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

// ============================================================================
// MULTI-GET
// ============================================================================

#[tokio::test]
async fn test_fetch_many_sends_ids_and_projection() {
    let (server, service) = service().await;
    Mock::given(method("POST"))
        .and(path("/state/_mget"))
        .and(query_param("_source_includes", "id,data"))
        .and(body_json(json!({"ids": ["1", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "docs": [
                {"_id": "1", "found": true, "_source": {"data": 3}},
                {"_id": "b", "found": false},
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let fields = vec!["id".to_string(), "data".to_string()];
    let hits = service
        .fetch_many("state", &[DocKey::from(1i64), DocKey::from("b")], &fields)
        .await
        .unwrap();

    assert_eq!(
        hits,
        vec![
            RemoteHit::found(DocKey::from(1i64), doc(json!({"data": 3}))),
            RemoteHit::missing(DocKey::from("b")),
        ]
    );
}

#[tokio::test]
async fn test_fetch_many_without_projection_has_no_query() {
    let (server, service) = service().await;
    Mock::given(method("POST"))
        .and(path("/state/_mget"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"docs": []})))
        .expect(1)
        .mount(&server)
        .await;

    service
        .fetch_many("state", &[DocKey::from("a")], &[])
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.query(), None);
}

#[tokio::test]
async fn test_fetch_many_error_status_is_unavailable() {
    let (server, service) = service().await;
    Mock::given(method("POST"))
        .and(path("/state/_mget"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = service.fetch_many("state", &[DocKey::from("a")], &[]).await;
    assert_remote_unavailable(&result, RemoteOperation::FetchMany);
}

#[tokio::test]
async fn test_fetch_many_malformed_body_is_invalid_response() {
    let (server, service) = service().await;
    Mock::given(method("POST"))
        .and(path("/state/_mget"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = service.fetch_many("state", &[DocKey::from("a")], &[]).await;
    assert!(matches!(
        result,
        Err(DocStateError::Storage(StorageError::InvalidResponse {
            operation: RemoteOperation::FetchMany,
            ..
        }))
    ));
}

// ============================================================================
// BULK
// ============================================================================

#[tokio::test]
async fn test_bulk_write_posts_ndjson() {
    let (server, service) = service().await;
    let a = doc(json!({"id": "a", "v": 1}));
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .and(|request: &Request| {
            ndjson_lines(&request.body)
                == vec![
                    json!({"index": {"_index": "state", "_id": "a"}}),
                    json!({"id": "a", "v": 1}),
                ]
        })
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 1, "errors": false, "items": [{"index": {"_id": "a", "status": 201}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let payload = bulk_payload("state", [(DocKey::from("a"), &a)]);
    service.bulk_write("state", payload).await.unwrap();
}

#[tokio::test]
async fn test_bulk_write_item_failure_is_rejected() {
    let (server, service) = service().await;
    let a = doc(json!({"id": "a"}));
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": true,
            "items": [{"index": {"_id": "a", "status": 400, "error": {"type": "mapper_parsing_exception"}}}]
        })))
        .mount(&server)
        .await;

    let payload = bulk_payload("state", [(DocKey::from("a"), &a)]);
    let result = service.bulk_write("state", payload).await;
    match result {
        Err(DocStateError::Storage(StorageError::RemoteRejected { collection, reason })) => {
            assert_eq!(collection, "state");
            assert!(reason.contains("mapper_parsing_exception"));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn test_bulk_write_error_status_is_unavailable() {
    let (server, service) = service().await;
    let a = doc(json!({"id": "a"}));
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(429).set_body_string("too many requests"))
        .mount(&server)
        .await;

    let payload = bulk_payload("state", [(DocKey::from("a"), &a)]);
    let result = service.bulk_write("state", payload).await;
    assert_remote_unavailable(&result, RemoteOperation::BulkWrite);
}
