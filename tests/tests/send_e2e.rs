//! End-to-end tests for `POST /api/send`.
//!
//! Requests go through the real router, extractors and pipeline; the
//! in-memory store is inspected afterwards.

use axum_test::TestServer;
use integration_tests::{fixtures, setup::TestContext};
use serde_json::{json, Value};
use uuid::Uuid;

async fn send(server: &TestServer, body: &Value, ip: &str, token: Option<&str>) -> Value {
    let mut request = server
        .post("/api/send")
        .add_header("User-Agent", fixtures::CHROME)
        .add_header("X-Forwarded-For", ip)
        .json(body);
    if let Some(token) = token {
        request = request.add_header("x-pulse-cache", token);
    }

    let response = request.await;
    response.assert_status_ok();
    response.json()
}

#[tokio::test]
async fn test_pageview_is_recorded() {
    let ctx = TestContext::new();

    let body = send(
        &ctx.server,
        &fixtures::pageview(ctx.website_id, "https://example.com/pricing?utm_source=news&plan=pro"),
        "203.0.113.10",
        None,
    )
    .await;

    assert!(body["cache"].as_str().is_some_and(|c| !c.is_empty()));
    let session_id: Uuid = serde_json::from_value(body["sessionId"].clone()).unwrap();
    assert!(body["visitId"].is_string());

    let events = ctx.store.events_for(ctx.website_id);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.session_id, session_id);
    assert_eq!(event.url_path, "/pricing");
    assert_eq!(event.url_query, "plan=pro");
    assert_eq!(event.campaign.utm_source.as_deref(), Some("news"));
    assert_eq!(event.referrer_domain, "google.com");

    assert_eq!(ctx.store.session_count(), 1);
    assert_eq!(ctx.usage(), 1);
}

#[tokio::test]
async fn test_token_continues_visit() {
    let ctx = TestContext::new();
    let page = fixtures::pageview(ctx.website_id, "/");

    let first = send(&ctx.server, &page, "203.0.113.11", None).await;
    let token = first["cache"].as_str().unwrap().to_string();

    let second = send(&ctx.server, &page, "203.0.113.11", Some(&token)).await;
    assert_eq!(first["sessionId"], second["sessionId"]);
    assert_eq!(first["visitId"], second["visitId"]);

    assert_eq!(ctx.store.event_count(), 2);
    assert_eq!(ctx.store.session_count(), 1);
    assert_eq!(ctx.usage(), 2);
}

#[tokio::test]
async fn test_same_client_without_token_gets_same_session() {
    let ctx = TestContext::new();
    let page = fixtures::pageview(ctx.website_id, "/");

    let first = send(&ctx.server, &page, "203.0.113.12", None).await;
    let second = send(&ctx.server, &page, "203.0.113.12", None).await;
    let other = send(&ctx.server, &page, "198.51.100.99", None).await;

    assert_eq!(first["sessionId"], second["sessionId"]);
    assert_ne!(first["sessionId"], other["sessionId"]);
    assert_eq!(ctx.store.session_count(), 2);
}

#[tokio::test]
async fn test_garbage_token_is_ignored() {
    let ctx = TestContext::new();
    let page = fixtures::pageview(ctx.website_id, "/");

    let body = send(&ctx.server, &page, "203.0.113.13", Some("not-a-token")).await;
    assert!(body["sessionId"].is_string());
    assert_eq!(ctx.store.event_count(), 1);
}

#[tokio::test]
async fn test_custom_event_keeps_name_and_data() {
    let ctx = TestContext::new();

    send(
        &ctx.server,
        &fixtures::custom_event(ctx.website_id, "signup", json!({ "plan": "pro" })),
        "203.0.113.14",
        None,
    )
    .await;

    let events = ctx.store.events();
    assert_eq!(events[0].event_name.as_deref(), Some("signup"));
    assert_eq!(
        events[0].data.as_ref().and_then(|d| d.get("plan")),
        Some(&json!("pro"))
    );
}

#[tokio::test]
async fn test_bot_gets_beep_boop() {
    let ctx = TestContext::new();

    let response = ctx
        .server
        .post("/api/send")
        .add_header("User-Agent", fixtures::GOOGLEBOT)
        .json(&fixtures::pageview(ctx.website_id, "/"))
        .await;

    response.assert_status_ok();
    response.assert_json(&json!({ "beep": "boop" }));
    assert_eq!(ctx.store.event_count(), 0);
    assert_eq!(ctx.usage(), 0);
}

#[tokio::test]
async fn test_payload_user_agent_overrides_header() {
    let ctx = TestContext::new();
    let mut page = fixtures::pageview(ctx.website_id, "/");
    page["payload"]["userAgent"] = json!(fixtures::GOOGLEBOT);

    let body = send(&ctx.server, &page, "203.0.113.15", None).await;
    assert_eq!(body, json!({ "beep": "boop" }));
}

#[tokio::test]
async fn test_identify_merges_session_data() {
    let ctx = TestContext::new();
    let ip = "203.0.113.16";

    let page = send(&ctx.server, &fixtures::pageview(ctx.website_id, "/"), ip, None).await;
    let token = page["cache"].as_str().unwrap().to_string();

    let first = send(
        &ctx.server,
        &fixtures::identify(ctx.website_id, "user-42", json!({ "plan": "hobby" })),
        ip,
        Some(&token),
    )
    .await;
    send(
        &ctx.server,
        &fixtures::identify(ctx.website_id, "user-42", json!({ "company": "Acme" })),
        ip,
        Some(&token),
    )
    .await;

    let session_id: Uuid = serde_json::from_value(first["sessionId"].clone()).unwrap();
    let bag = ctx
        .store
        .session_data(ctx.website_id, session_id)
        .expect("session data stored");
    assert_eq!(bag.distinct_id.as_deref(), Some("user-42"));
    assert_eq!(bag.data.get("plan"), Some(&json!("hobby")));
    assert_eq!(bag.data.get("company"), Some(&json!("Acme")));

    // Identify calls are not events
    assert_eq!(ctx.store.event_count(), 1);
    assert_eq!(ctx.usage(), 1);
}

#[tokio::test]
async fn test_geo_headers_reach_session() {
    let ctx = TestContext::new();

    ctx.server
        .post("/api/send")
        .add_header("User-Agent", fixtures::FIREFOX)
        .add_header("X-Real-IP", "203.0.113.17")
        .add_header("cf-ipcountry", "NZ")
        .add_header("x-vercel-ip-city", "Wellington")
        .json(&fixtures::pageview(ctx.website_id, "/"))
        .await
        .assert_status_ok();

    let sessions = ctx.store.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].country.as_deref(), Some("NZ"));
    assert_eq!(sessions[0].city.as_deref(), Some("Wellington"));
    assert_eq!(sessions[0].browser, "Firefox");
}
