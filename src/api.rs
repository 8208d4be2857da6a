//! HTTP surface of the telemetry daemon.
//!
//! - **POST /agent/start**, **POST /agent/stop**: the command surface. Both are
//!   safe to call repeatedly and in any order.
//! - **GET /agent/status**: movement state, buffer depth and live config.
//! - **PUT /session**: the host application reports whether the operator
//!   session is valid.
//! - **POST /sensors/inertial**, **POST /sensors/location**: the sensor bridge
//!   pushes readings here. They are accepted only while the agent has an
//!   active subscription.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, instrument};

use crate::agent::{AgentStatus, StartOutcome, TelemetryAgent};
use crate::session::SessionFlag;
use crate::signal::InertialEvent;
use crate::sources::{FeedSource, LocationReading};
use crate::uploader::TelemetryClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<TelemetryAgent<TelemetryClient>>,
    pub feed: Arc<FeedSource>,
    pub session: Arc<SessionFlag>,
}

/// Build the daemon router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/agent/status", get(get_status))
        .route("/agent/start", post(start_agent))
        .route("/agent/stop", post(stop_agent))
        .route("/session", put(put_session))
        .route("/sensors/inertial", post(post_inertial))
        .route("/sensors/location", post(post_location))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /agent/status - Snapshot of the agent.
#[instrument(skip(state))]
pub async fn get_status(State(state): State<AppState>) -> Json<AgentStatus> {
    Json(state.agent.status())
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub outcome: StartOutcome,
}

/// POST /agent/start - Start telemetry collection.
///
/// Returns `202 Accepted` when started, `200 OK` when already running and
/// `403 Forbidden` when the session is not valid.
#[instrument(skip(state))]
pub async fn start_agent(State(state): State<AppState>) -> impl IntoResponse {
    let session = Arc::clone(&state.session);
    let outcome = state.agent.start(session).await;

    let status = match outcome {
        StartOutcome::Started => StatusCode::ACCEPTED,
        StartOutcome::AlreadyRunning => StatusCode::OK,
        StartOutcome::SessionInvalid => StatusCode::FORBIDDEN,
    };
    info!(outcome = ?outcome, "Start requested");

    (status, Json(StartResponse { outcome }))
}

#[derive(Debug, Serialize)]
pub struct StopResponse {
    pub was_running: bool,
}

/// POST /agent/stop - Stop telemetry collection.
#[instrument(skip(state))]
pub async fn stop_agent(State(state): State<AppState>) -> Json<StopResponse> {
    let was_running = state.agent.stop().await;
    info!(was_running, "Stop requested");
    Json(StopResponse { was_running })
}

#[derive(Debug, Deserialize)]
pub struct SessionUpdate {
    pub valid: bool,
}

/// PUT /session - Report operator session validity.
///
/// # Request Body
///
/// ```json
/// {
///     "valid": true
/// }
/// ```
///
/// An invalid session blocks `start` and suppresses uploads; samples keep
/// buffering until it becomes valid again.
///
/// # Response
///
/// Returns `204 No Content`.
#[instrument(skip(state))]
pub async fn put_session(
    State(state): State<AppState>,
    Json(update): Json<SessionUpdate>,
) -> StatusCode {
    state.session.set_valid(update.valid);
    info!(valid = update.valid, "Session validity updated");
    StatusCode::NO_CONTENT
}

/// POST /sensors/inertial - Push one gyroscope or accelerometer reading.
///
/// # Request Body
///
/// ```json
/// {
///     "sensor": "gyroscope",
///     "values": [0.02, -0.15, 0.01],
///     "timestamp_ns": 1700000000000000000
/// }
/// ```
///
/// `sensor` is `"gyroscope"` (rad/s) or `"accelerometer"` (m/s², gravity
/// included). `timestamp_ns` is optional.
///
/// # Response
///
/// Returns `202 Accepted` when the reading was stored and `409 Conflict`
/// while the agent holds no inertial subscription.
pub async fn post_inertial(
    State(state): State<AppState>,
    Json(event): Json<InertialEvent>,
) -> StatusCode {
    if state.feed.push_inertial(&event) {
        StatusCode::ACCEPTED
    } else {
        debug!(sensor = ?event.sensor, "Inertial reading rejected; not subscribed");
        StatusCode::CONFLICT
    }
}

/// POST /sensors/location - Push one position fix.
///
/// # Request Body
///
/// ```json
/// {
///     "latitude": 41.3851,
///     "longitude": 2.1734,
///     "accuracy_m": 6.5,
///     "speed_mps": 1.8,
///     "bearing_deg": 270.0,
///     "altitude_m": 12.0,
///     "provider": "gps"
/// }
/// ```
///
/// Only `latitude` and `longitude` are required. The fix is stamped with the
/// agent clock on arrival; `provider` defaults to `"fused"`.
///
/// # Response
///
/// Returns `202 Accepted` when the fix was stored and `409 Conflict` while
/// location updates are not requested.
pub async fn post_location(
    State(state): State<AppState>,
    Json(reading): Json<LocationReading>,
) -> StatusCode {
    if state.feed.push_location(reading) {
        StatusCode::ACCEPTED
    } else {
        debug!("Location reading rejected; updates not requested");
        StatusCode::CONFLICT
    }
}
