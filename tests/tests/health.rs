//! Tests for health check endpoints.

use axum::http::StatusCode;
use integration_tests::setup::TestContext;
use serde_json::Value;

/// Test /health endpoint returns proper structure
#[tokio::test]
async fn test_health_endpoint_structure() {
    let ctx = TestContext::new();

    let response = ctx.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage_connected"], true);
    assert_eq!(body["scheduler_healthy"], true);
    assert_eq!(body["scheduler_state"], "dormant");
}

#[tokio::test]
async fn test_health_reports_storage_outage() {
    let ctx = TestContext::new();
    ctx.store.set_fail_reads(true);

    let body: Value = ctx.server.get("/health").await.json();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["storage_connected"], false);

    ctx.server
        .get("/health/ready")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_liveness_and_readiness() {
    let ctx = TestContext::new();
    ctx.server.get("/health/live").await.assert_status_ok();
    ctx.server.get("/health/ready").await.assert_status_ok();
}

#[tokio::test]
async fn test_scheduler_stats_before_any_run() {
    let ctx = TestContext::new();

    let response = ctx.server.get("/health/scheduler").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["state"], "dormant");
    assert_eq!(body["totalRuns"], 0);
    assert_eq!(body["isRunning"], false);
    assert!(body["lastRun"].is_null());
}

#[tokio::test]
async fn test_scheduler_reports_run_summary() {
    let ctx = TestContext::new();
    ctx.scheduler.run_now().await.unwrap();

    let body: Value = ctx.server.get("/health/scheduler").await.json();
    assert_eq!(body["totalRuns"], 1);
    assert!(body["lastSuccess"].is_string());
    assert_eq!(body["lastSummary"]["accountsProcessed"], 1);
}

#[tokio::test]
async fn test_repeated_fatal_runs_turn_unhealthy() {
    let ctx = TestContext::new();
    ctx.store.set_fail_account_listing(true);

    for _ in 0..4 {
        assert!(ctx.scheduler.run_now().await.is_err());
    }

    let response = ctx.server.get("/health/scheduler").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["errorCount"], 4);

    let health: Value = ctx.server.get("/health").await.json();
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_count_accepted_events() {
    let ctx = TestContext::new();
    ctx.server
        .post("/api/send")
        .add_header("User-Agent", integration_tests::fixtures::CHROME)
        .json(&integration_tests::fixtures::pageview(ctx.website_id, "/"))
        .await
        .assert_status_ok();

    let response = ctx.server.get("/health/metrics").await;
    response.assert_status_ok();
    let body: Value = response.json();
    // Counters are process-wide and other tests run concurrently
    assert!(body["eventsReceived"].as_u64().unwrap() >= 1);
    assert!(body["eventsPersisted"].as_u64().unwrap() >= 1);
    assert!(body["takenAt"].is_string());
}
