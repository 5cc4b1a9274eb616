//! Integration Tests for API Endpoints
//!
//! Tests full request/response cycle for each endpoint.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use unified_cache::{
    api::create_router, AppState, CacheConfig, CacheManager, ManagerSettings, ManualClock,
    OnlineFlag,
};

// == Helper Functions ==

fn create_test_app() -> (Router, ManualClock) {
    let clock = ManualClock::new(1_000_000);
    let cache = CacheManager::with_environment(
        ManagerSettings::default(),
        Arc::new(clock.clone()),
        Arc::new(OnlineFlag::default()),
    );
    let state = AppState::new(cache, CacheConfig::default());
    (create_router(state), clock)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

fn put_entry(body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri("/entries")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_entry(key: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("/entries/{}", key))
        .body(Body::empty())
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// == PUT /entries ==

#[tokio::test]
async fn test_set_endpoint_success() {
    let (app, _clock) = create_test_app();

    let (status, json) = send(&app, put_entry(json!({"key": "test_key", "value": "v"}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["key"], "test_key");
    assert_eq!(json["size"], 3);
    assert_eq!(json["ttl_ms"], 300_000);
}

#[tokio::test]
async fn test_set_endpoint_rejects_inverted_windows() {
    let (app, _clock) = create_test_app();

    let (status, json) = send(
        &app,
        put_entry(json!({"key": "k", "value": 1, "ttl_ms": 500, "max_age_ms": 100})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("config"));
}

#[tokio::test]
async fn test_set_endpoint_oversized_value_keeps_prior_entry() {
    let (app, _clock) = create_test_app();
    send(&app, put_entry(json!({"key": "k", "value": "small"}))).await;

    let (status, _) = send(
        &app,
        put_entry(json!({"key": "k", "value": "x".repeat(200), "max_size": 64})),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let (status, json) = send(&app, get_entry("k")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"], "small");
}

#[tokio::test]
async fn test_invalid_json_request() {
    let (app, _clock) = create_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/entries")
                .header("content-type", "application/json")
                .body(Body::from("not valid json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_empty_key_request() {
    let (app, _clock) = create_test_app();

    let (status, json) = send(&app, put_entry(json!({"key": "", "value": 1}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json.get("error").is_some());
}

// == GET /entries/:key ==

#[tokio::test]
async fn test_get_endpoint_success() {
    let (app, _clock) = create_test_app();
    send(
        &app,
        put_entry(json!({"key": "vehicles:1", "value": {"lat": 52.1, "lon": 4.3}})),
    )
    .await;

    let (status, json) = send(&app, get_entry("vehicles:1")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["value"]["lat"], 52.1);
    assert_eq!(json["is_stale"], false);
}

#[tokio::test]
async fn test_get_endpoint_not_found() {
    let (app, _clock) = create_test_app();

    let (status, json) = send(&app, get_entry("nonexistent")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("nonexistent"));
}

#[tokio::test]
async fn test_get_endpoint_reports_staleness() {
    let (app, clock) = create_test_app();
    send(
        &app,
        put_entry(json!({"key": "k", "value": 1, "ttl_ms": 100, "max_age_ms": 200})),
    )
    .await;

    clock.advance(Duration::from_millis(150));
    let (_, json) = send(&app, get_entry("k")).await;
    assert_eq!(json["is_stale"], true);

    // Past max age, still readable until swept
    clock.advance(Duration::from_millis(100));
    let (status, json) = send(&app, get_entry("k")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["is_stale"], true);
}

// == DELETE /entries/:key ==

#[tokio::test]
async fn test_delete_endpoint_success() {
    let (app, _clock) = create_test_app();
    send(&app, put_entry(json!({"key": "gone", "value": 1}))).await;

    let (status, json) = send(&app, delete("/entries/gone")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cleared"], true);

    let (status, _) = send(&app, get_entry("gone")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_endpoint_not_found() {
    let (app, _clock) = create_test_app();

    let (status, _) = send(&app, delete("/entries/missing")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// == DELETE /entries ==

#[tokio::test]
async fn test_clear_by_pattern() {
    let (app, _clock) = create_test_app();
    for key in ["vehicles:1", "vehicles:2", "routes:1"] {
        send(&app, put_entry(json!({"key": key, "value": key}))).await;
    }

    let (status, json) = send(&app, delete("/entries?pattern=%5Evehicles%3A")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 2);

    let (status, _) = send(&app, get_entry("routes:1")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, get_entry("vehicles:1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_clear_all_without_pattern() {
    let (app, _clock) = create_test_app();
    for key in ["a", "b", "c"] {
        send(&app, put_entry(json!({"key": key, "value": 0}))).await;
    }

    let (status, json) = send(&app, delete("/entries")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 3);
}

#[tokio::test]
async fn test_clear_invalid_pattern() {
    let (app, _clock) = create_test_app();

    let (status, json) = send(&app, delete("/entries?pattern=%28")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("pattern"));
}

// == POST /cleanup ==

#[tokio::test]
async fn test_cleanup_endpoint_removes_expired() {
    let (app, clock) = create_test_app();
    send(
        &app,
        put_entry(json!({"key": "short", "value": 1, "ttl_ms": 10, "max_age_ms": 20})),
    )
    .await;
    send(&app, put_entry(json!({"key": "long", "value": 1}))).await;

    clock.advance(Duration::from_millis(50));
    let (status, json) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/cleanup")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], 1);
    let (status, _) = send(&app, get_entry("long")).await;
    assert_eq!(status, StatusCode::OK);
}

// == GET /stats ==

#[tokio::test]
async fn test_stats_endpoint() {
    let (app, _clock) = create_test_app();
    for key in ["vehicles:1", "vehicles:2", "routes:1"] {
        send(&app, put_entry(json!({"key": key, "value": key}))).await;
    }

    let (status, json) = send(
        &app,
        Request::builder().uri("/stats").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_entries"], 3);
    assert_eq!(json["valid_entries"], 3);
    assert_eq!(json["entries_by_prefix"]["vehicles"], 2);
    assert_eq!(json["entries_by_prefix"]["routes"], 1);
    assert_eq!(json["in_flight"], 0);
    assert_eq!(json["memory_pressure"], false);
    assert!(json.get("hit_rate").is_some());
}

// == GET /health ==

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _clock) = create_test_app();

    let (status, json) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["entries"], 0);
    assert!(json.get("timestamp").is_some());
}
