//! Tests for the health and status endpoints.
//!
//! Requires Docker to be running for testcontainers, or
//! `OTEL_INGEST_TEST_CLICKHOUSE_URL` pointing at a server.

use axum::http::StatusCode;
use axum_test::TestServer;
use ingest_core::Signal;
use integration_tests::fixtures::{malformed_file, trace_file, JAN_1_2024_NS};
use integration_tests::setup::TestContext;
use tokio_util::sync::CancellationToken;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/health").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    let status = body["status"].as_str().unwrap_or("");
    assert!(
        status == "healthy" || status == "degraded" || status == "unhealthy",
        "Status should be 'healthy', 'degraded', or 'unhealthy', got '{}'",
        status
    );
    assert!(
        body["components"].is_array(),
        "Response should have a 'components' list"
    );
}

/// Test /health/ready and /health/live answer without authentication
#[tokio::test]
async fn test_probe_endpoints() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    for path in ["/health/ready", "/health/live"] {
        let status = server.get(path).await.status_code();
        assert!(
            status == StatusCode::OK || status == StatusCode::SERVICE_UNAVAILABLE,
            "{} should return 200 or 503, got {}",
            path,
            status
        );
    }
}

/// Test /status on an empty ledger
#[tokio::test]
async fn test_status_on_empty_ledger() {
    let ctx = TestContext::new().await;
    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");

    let response = server.get("/status").await;
    response.assert_status_ok();

    let body: serde_json::Value = response.json();
    for signal in Signal::ALL {
        assert_eq!(body["ledger"]["files"][signal.as_str()]["done"], 0);
    }
    assert!(body["ledger"]["cursor"].is_null());
    assert!(body["metrics"].is_object());
}

/// Test /status reflects a loader cycle and an enrichment batch
#[tokio::test]
async fn test_status_reflects_pipeline_progress() {
    let ctx = TestContext::new().await;
    ctx.put_raw("traces/a.json", trace_file("checkout", 3, 3, JAN_1_2024_NS))
        .await;
    ctx.put_raw("traces/broken.json", malformed_file()).await;

    ctx.loader(Signal::Traces, None)
        .poll_and_load(&CancellationToken::new())
        .await
        .unwrap();
    ctx.tracker(10).enrich_batch().await.unwrap();

    let server = TestServer::new(ctx.router.clone()).expect("Failed to create test server");
    let body: serde_json::Value = server.get("/status").await.json();

    let traces = &body["ledger"]["files"]["traces"];
    assert_eq!(traces["done"], 1);
    assert_eq!(traces["failed"], 1);
    assert_eq!(traces["rows_loaded"], 3);
    assert_eq!(body["ledger"]["cursor"]["key"], "global");
}
