//! HTTP API status codes and bodies, exercised through the router in-process.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

use common::{build_context, FakeProvider, FakeSource};
use vault_index::app::AppContext;
use vault_index::progress::NoProgress;
use vault_index::server::router;

async fn call(ctx: &AppContext, method: &str, uri: &str) -> (StatusCode, Value) {
    let app = router(ctx.clone()).unwrap();
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn synced_context(tmp: &TempDir) -> AppContext {
    let source = FakeSource::new();
    source.put("r", "Rust.md", "2024-01-02T00:00:00Z", "rust #lang");
    source.put("g", "Garden.md", "2024-01-01T00:00:00Z", "garden #outside");
    let ctx = build_context(tmp.path(), FakeProvider::new(), Some(source)).await;
    ctx.sync.run_inline(&NoProgress).await.unwrap();
    ctx
}

#[tokio::test]
async fn health_reports_ok() {
    let tmp = TempDir::new().unwrap();
    let ctx = build_context(tmp.path(), FakeProvider::new(), None).await;
    let (status, body) = call(&ctx, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn semantic_search_errors_map_to_codes() {
    let tmp = TempDir::new().unwrap();
    let ctx = build_context(tmp.path(), FakeProvider::new(), None).await;

    let (status, body) = call(&ctx, "GET", "/api/search/semantic?q=rust").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "search_unavailable");

    let (status, body) = call(&ctx, "GET", "/api/search/semantic?q=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn embedding_failure_is_bad_gateway() {
    let tmp = TempDir::new().unwrap();
    let provider = FakeProvider::new();
    let source = FakeSource::new();
    source.put("r", "r.md", "2024-01-01T00:00:00Z", "rust");
    let ctx = build_context(tmp.path(), provider.clone(), Some(source)).await;
    ctx.sync.run_inline(&NoProgress).await.unwrap();

    provider.set_failing(true);
    let (status, body) = call(&ctx, "GET", "/api/search/semantic?q=rust").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "embedding_failed");
}

#[tokio::test]
async fn semantic_and_lexical_search_return_documents() {
    let tmp = TempDir::new().unwrap();
    let ctx = synced_context(&tmp).await;

    let (status, body) = call(&ctx, "GET", "/api/search/semantic?q=garden&k=1").await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], "g");
    assert_eq!(results[0]["tags"][0], "outside");

    let (status, body) = call(&ctx, "GET", "/api/search?q=rust").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"][0]["title"], "Rust");
}

#[tokio::test]
async fn notes_listing_lookup_and_delete() {
    let tmp = TempDir::new().unwrap();
    let ctx = synced_context(&tmp).await;

    let (status, body) = call(&ctx, "GET", "/api/notes?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["notes"].as_array().unwrap().len(), 1);
    assert_eq!(body["notes"][0]["id"], "r");

    let (status, body) = call(&ctx, "GET", "/api/notes/g").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["content"], "garden #outside");

    let (status, _) = call(&ctx, "DELETE", "/api/notes/g").await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(&ctx, "GET", "/api/notes/g").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, body) = call(&ctx, "GET", "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["documents"], 1);
    assert_eq!(body["indexed_vectors"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sync_trigger_is_single_flight() {
    let tmp = TempDir::new().unwrap();
    let source = FakeSource::new();
    source.put("r", "r.md", "2024-01-01T00:00:00Z", "rust");
    let gate = source.hold_listing();
    let ctx = build_context(tmp.path(), FakeProvider::new(), Some(source)).await;

    let (status, body) = call(&ctx, "POST", "/api/sync").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "started");

    let (status, body) = call(&ctx, "POST", "/api/sync").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "sync_in_progress");

    let (_, body) = call(&ctx, "GET", "/api/sync/status").await;
    assert_eq!(body["phase"], "syncing");

    gate.notify_one();
    for _ in 0..200 {
        let (_, body) = call(&ctx, "GET", "/api/sync/status").await;
        if body["phase"] == "success" {
            assert_eq!(body["processed"], 1);
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("sync did not finish");
}
