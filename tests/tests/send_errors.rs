//! Error outcomes of `POST /api/send`: status, machine code, and no side effects.

use axum::http::StatusCode;
use axum_test::TestResponse;
use collector_core::{Account, Website};
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};
use uuid::Uuid;

fn assert_error(response: &TestResponse, status: StatusCode, code: &str) {
    response.assert_status(status);
    let body: Value = response.json();
    assert_eq!(body["code"], code, "unexpected body: {body}");
    assert!(body["error"].is_string());
}

async fn post(ctx: &TestContext, body: &Value) -> TestResponse {
    ctx.server
        .post("/api/send")
        .add_header("User-Agent", fixtures::CHROME)
        .add_header("X-Forwarded-For", "203.0.113.50")
        .json(body)
        .await
}

#[tokio::test]
async fn test_malformed_json() {
    let ctx = TestContext::new();
    let response = ctx
        .server
        .post("/api/send")
        .bytes("{not json".into())
        .await;

    assert_error(&response, StatusCode::BAD_REQUEST, "VALID_001");
    assert_eq!(ctx.store.event_count(), 0);
}

#[tokio::test]
async fn test_unknown_type() {
    let ctx = TestContext::new();
    let body = json!({ "type": "pageleave", "payload": { "website": ctx.website_id } });
    assert_error(&post(&ctx, &body).await, StatusCode::BAD_REQUEST, "VALID_001");
}

#[tokio::test]
async fn test_website_must_be_uuid() {
    let ctx = TestContext::new();
    let body = json!({ "type": "event", "payload": { "website": "example.com", "url": "/" } });
    assert_error(&post(&ctx, &body).await, StatusCode::BAD_REQUEST, "VALID_001");
}

#[tokio::test]
async fn test_oversized_body() {
    let ctx = TestContext::new();
    let response = ctx
        .server
        .post("/api/send")
        .bytes(fixtures::oversized(ctx.website_id).into())
        .await;

    assert_error(&response, StatusCode::BAD_REQUEST, "VALID_001");
}

#[tokio::test]
async fn test_unknown_website() {
    let ctx = TestContext::new();
    let response = post(&ctx, &fixtures::pageview(Uuid::new_v4(), "/")).await;

    assert_error(&response, StatusCode::NOT_FOUND, "SITE_001");
    assert_eq!(ctx.store.session_count(), 0);
}

#[tokio::test]
async fn test_suspended_owner_even_over_quota() {
    let ctx = TestContext::new();
    let owner = Uuid::new_v4();
    let website = Uuid::new_v4();
    ctx.store.add_account(Account::new(owner, "hobby").suspended());
    ctx.store.add_website(Website::owned_by_user(website, owner));
    ctx.store.set_usage(
        owner,
        collector_core::YearMonth::current(),
        10_000_000,
    );

    let response = post(&ctx, &fixtures::pageview(website, "/")).await;
    assert_error(&response, StatusCode::FORBIDDEN, "ACCESS_001");
    assert_eq!(ctx.store.event_count(), 0);
}

#[tokio::test]
async fn test_quota_boundary() {
    let ctx = TestContext::new();
    // Hobby allows 100,000 events a month
    ctx.set_usage(99_999);

    post(&ctx, &fixtures::pageview(ctx.website_id, "/"))
        .await
        .assert_status_ok();
    assert_eq!(ctx.usage(), 100_000);

    let response = post(&ctx, &fixtures::pageview(ctx.website_id, "/")).await;
    assert_error(&response, StatusCode::TOO_MANY_REQUESTS, "LIMIT_001");
    assert_eq!(ctx.usage(), 100_000);
    assert_eq!(ctx.store.event_count(), 1);
}

#[tokio::test]
async fn test_identify_allowed_over_quota() {
    let ctx = TestContext::new();
    ctx.set_usage(100_000);

    post(&ctx, &fixtures::identify(ctx.website_id, "user-1", json!({ "a": 1 })))
        .await
        .assert_status_ok();
    assert_eq!(ctx.usage(), 100_000);
}

#[tokio::test]
async fn test_store_failure_leaves_usage_untouched() {
    let ctx = TestContext::new();
    ctx.store.set_fail_event_writes(true);

    let response = post(&ctx, &fixtures::pageview(ctx.website_id, "/")).await;
    assert_error(&response, StatusCode::SERVICE_UNAVAILABLE, "STORE_001");
    assert_eq!(ctx.usage(), 0);
    assert_eq!(ctx.store.event_count(), 0);
}
