//! Command channel over the HTTP router.

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use request_failure_tracker::commands::command_router;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

use common::{completed, error_occurred, TestTracker};

async fn command(router: &Router, body: Value) -> Value {
    let response = router
        .clone()
        .oneshot(
            Request::post("/command")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_list_returns_newest_first() {
    let t = TestTracker::start().await;
    t.send(completed("1", "https://api.test/first", 404)).await;
    t.send(error_occurred("2", "https://api.test/second", "net::ERR_TIMED_OUT")).await;
    let router = command_router(t.tracker.app_state());

    let body = command(&router, json!({"action": "getFailedRequests"})).await;
    let failed = body["failedRequests"].as_array().unwrap();
    assert_eq!(failed.len(), 2);
    assert_eq!(failed[0]["url"], "https://api.test/second");
    assert!(failed[0]["statusCode"].is_null());
    assert_eq!(failed[1]["statusCode"], 404);
    t.stop().await;
}

#[tokio::test]
async fn test_clear_then_list_is_empty() {
    let t = TestTracker::start().await;
    t.send(completed("1", "https://api.test/a", 500)).await;
    assert_eq!(t.indicator.snapshot().text, "1");
    let router = command_router(t.tracker.app_state());

    let cleared = command(&router, json!({"action": "clearFailedRequests"})).await;
    assert_eq!(cleared, json!({"success": true}));
    assert_eq!(t.indicator.snapshot().text, "");

    let listed = command(&router, json!({"action": "getFailedRequests"})).await;
    assert_eq!(listed, json!({"failedRequests": []}));
    t.stop().await;
}

#[tokio::test]
async fn test_unknown_action_is_reported() {
    let t = TestTracker::start().await;
    let router = command_router(t.tracker.app_state());

    let body = command(&router, json!({"action": "exportFailedRequests"})).await;
    assert_eq!(body, json!({"error": "Unknown action: exportFailedRequests"}));
    t.stop().await;
}

#[tokio::test]
async fn test_storage_outage_is_surfaced() {
    let t = TestTracker::start().await;
    let router = command_router(t.tracker.app_state());

    t.backend.set_offline(true);
    let body = command(&router, json!({"action": "getFailedRequests"})).await;
    assert!(body["error"].as_str().unwrap().contains("unavailable"));
    t.backend.set_offline(false);
    t.stop().await;
}

#[tokio::test]
async fn test_store_changes_are_broadcast() {
    let t = TestTracker::start().await;
    let mut changes = t.tracker.storage.subscribe();

    t.send(completed("1", "https://api.test/a", 500)).await;

    let change = changes.recv().await.unwrap();
    assert_eq!(change.key, "failedRequests");
    assert_eq!(change.area, "local");
    assert!(change.old_value.is_none());
    assert_eq!(change.new_value.unwrap().as_array().unwrap().len(), 1);
    t.stop().await;
}
