//! Integration tests for the daemon HTTP surface.
//!
//! These tests drive the full request/response cycle through the router. The
//! collector URL points at a closed port, so uploads fail and are dropped.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::json;

use forklift_telemetry::agent::TelemetryAgent;
use forklift_telemetry::api::{AppState, router};
use forklift_telemetry::clock::AgentClock;
use forklift_telemetry::config::{AgentConfig, AgentSettings};
use forklift_telemetry::session::SessionFlag;
use forklift_telemetry::sources::FeedSource;
use forklift_telemetry::uploader::{TelemetryClient, UploadContext};

fn create_test_server(session_valid: bool) -> TestServer {
    let settings = AgentSettings {
        base_url: "http://127.0.0.1:9/api".to_string(),
        upload_timeout: Duration::from_millis(200),
        ..AgentSettings::default()
    };
    let clock = AgentClock::new();
    let feed = Arc::new(FeedSource::new(clock));
    let agent = TelemetryAgent::new(
        AgentConfig::default(),
        UploadContext::from_settings(&settings),
        TelemetryClient::from_settings(&settings).unwrap(),
        clock,
        feed.clone(),
        feed.clone(),
    );

    let state = AppState {
        agent: Arc::new(agent),
        feed,
        session: Arc::new(SessionFlag::new(session_valid)),
    };

    TestServer::new(router(state)).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server(true);

    let response = server.get("/health").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_status_before_start() {
    let server = create_test_server(true);

    let response = server.get("/agent/status").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["running"], false);
    assert_eq!(body["movement_state"], "unknown");
    assert_eq!(body["pending_samples"], 0);
    assert_eq!(body["config"]["move_min_ms"], 1500);
    assert!(body["location_request"].is_null());
}

#[tokio::test]
async fn test_start_and_stop_cycle() {
    let server = create_test_server(true);

    let response = server.post("/agent/start").await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "started");

    let response = server.post("/agent/start").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "already_running");

    let status: serde_json::Value = server.get("/agent/status").await.json();
    assert_eq!(status["running"], true);
    assert_eq!(status["location_request"]["interval_ms"], 20000);
    assert_eq!(status["location_request"]["priority"], "high_accuracy");

    let response = server.post("/agent/stop").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["was_running"], true);

    let body: serde_json::Value = server.post("/agent/stop").await.json();
    assert_eq!(body["was_running"], false);
}

#[tokio::test]
async fn test_start_refused_without_session() {
    let server = create_test_server(false);

    let response = server.post("/agent/start").await;

    response.assert_status(axum::http::StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "session_invalid");
}

#[tokio::test]
async fn test_session_update_enables_start() {
    let server = create_test_server(false);

    server
        .put("/session")
        .json(&json!({ "valid": true }))
        .await
        .assert_status(axum::http::StatusCode::NO_CONTENT);

    server
        .post("/agent/start")
        .await
        .assert_status(axum::http::StatusCode::ACCEPTED);

    server.post("/agent/stop").await.assert_status_ok();
}

#[tokio::test]
async fn test_sensor_feed_rejected_while_stopped() {
    let server = create_test_server(true);

    let response = server
        .post("/sensors/inertial")
        .json(&json!({
            "sensor": "gyroscope",
            "values": [0.1, 0.2, 0.3]
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);

    let response = server
        .post("/sensors/location")
        .json(&json!({
            "latitude": 41.38,
            "longitude": 2.17
        }))
        .await;
    response.assert_status(axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_sensor_feed_accepted_while_running() {
    let server = create_test_server(true);
    server.post("/agent/start").await;

    let response = server
        .post("/sensors/inertial")
        .json(&json!({
            "sensor": "accelerometer",
            "values": [0.0, 0.0, 9.81],
            "timestamp_ns": 123
        }))
        .await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);

    let response = server
        .post("/sensors/location")
        .json(&json!({
            "latitude": 41.38,
            "longitude": 2.17,
            "accuracy_m": 5.0,
            "speed_mps": 0.0
        }))
        .await;
    response.assert_status(axum::http::StatusCode::ACCEPTED);

    server.post("/agent/stop").await.assert_status_ok();
}

#[tokio::test]
async fn test_malformed_sensor_payload_is_rejected() {
    let server = create_test_server(true);
    server.post("/agent/start").await;

    let response = server
        .post("/sensors/inertial")
        .json(&json!({
            "sensor": "magnetometer",
            "values": [0.0, 0.0, 0.0]
        }))
        .await;

    assert!(response.status_code().is_client_error());

    server.post("/agent/stop").await;
}
