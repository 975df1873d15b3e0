//! Idle-session watchdog as seen by HTTP clients.
//!
//! Expiry is forced by sweeping the registry at a future instant rather than
//! by pausing the runtime clock, which the SQLite pool does not tolerate.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use tokio::time::Instant;

use crave_core::UserRole;
use crave_integration_tests::{PASSWORD, TestApp};
use crave_server::services::SessionEvent;

const REMAINING: &str = "x-session-remaining";

fn remaining_header(resp: &crave_integration_tests::TestResponse) -> Option<u64> {
    resp.headers
        .get(REMAINING)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
}

#[tokio::test]
async fn test_requests_report_remaining_idle_time() {
    let app = TestApp::new().await;
    let mut client = app.signed_in("busy@example.com", UserRole::Customer).await;

    let resp = client.get("/api/cart").await;
    assert_eq!(resp.status, StatusCode::OK);
    let remaining = remaining_header(&resp).unwrap();
    assert!((899..=900).contains(&remaining), "remaining = {remaining}");

    // Anonymous requests carry no countdown
    let resp = app.client().get("/api/foods").await;
    assert!(remaining_header(&resp).is_none());
}

#[tokio::test]
async fn test_status_poll_does_not_count_as_activity() {
    let app = TestApp::new().await;
    let mut client = app.signed_in("poller@example.com", UserRole::Customer).await;

    let resp = client.get("/api/session").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(remaining_header(&resp).is_none());
    assert_eq!(resp.body["authenticated"], true);
    assert_eq!(resp.body["session"]["warning"], false);
    assert!(resp.body["session"]["remaining_secs"].as_u64().unwrap() <= 900);

    let resp = app.client().get("/api/session").await;
    assert_eq!(resp.body, json!({ "authenticated": false }));
}

#[tokio::test]
async fn test_idle_session_is_signed_out() {
    let app = TestApp::new().await;
    let mut client = app.signed_in("sleepy@example.com", UserRole::Customer).await;
    assert_eq!(app.state.sessions().active_count().await, 1);

    let later = Instant::now() + Duration::from_secs(15 * 60 + 1);
    let events = app.state.sessions().evaluate(later).await;
    assert!(matches!(events.as_slice(), [SessionEvent::Expired { .. }]));
    assert_eq!(app.state.sessions().active_count().await, 0);

    let resp = client.get("/api/cart").await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert!(!client.has_session_cookie());

    let resp = client.get("/api/session").await;
    assert_eq!(resp.body["authenticated"], false);

    // Signing in again starts a fresh session
    let resp = client
        .post(
            "/api/auth/login",
            &json!({ "email": "sleepy@example.com", "password": PASSWORD }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(client.get("/api/cart").await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_warning_then_heartbeat_extends_session() {
    let app = TestApp::new().await;
    let mut client = app.signed_in("nearly@example.com", UserRole::Customer).await;

    let near_end = Instant::now() + Duration::from_secs(15 * 60 - 30);
    let events = app.state.sessions().evaluate(near_end).await;
    match events.as_slice() {
        [SessionEvent::Warning { remaining, .. }] => {
            assert!(*remaining <= Duration::from_secs(30));
        }
        other => panic!("expected a single warning, got {other:?}"),
    }

    // One warning per idle stretch
    assert!(app.state.sessions().evaluate(near_end).await.is_empty());

    let resp = client.post("/api/session/heartbeat", &json!({})).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["warning"], false);
    assert!(resp.body["remaining_secs"].as_u64().unwrap() >= 899);
    assert!(resp.body["age_secs"].is_u64());
}

#[tokio::test]
async fn test_heartbeat_requires_session() {
    let app = TestApp::new().await;

    let resp = app.client().post("/api/session/heartbeat", &json!({})).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_shorter_timeout_from_config() {
    let app = TestApp::with_config(|config| {
        config.session.idle_timeout = Duration::from_secs(120);
        config.session.warning_threshold = Duration::from_secs(20);
    })
    .await;
    let mut client = app.signed_in("quick@example.com", UserRole::Customer).await;

    let resp = client.get("/api/cart").await;
    assert!(remaining_header(&resp).unwrap() <= 120);

    let events = app
        .state
        .sessions()
        .evaluate(Instant::now() + Duration::from_secs(121))
        .await;
    assert_eq!(events.len(), 1);
    assert_eq!(client.get("/api/cart").await.status, StatusCode::UNAUTHORIZED);
}
