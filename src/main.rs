//! Forklift telemetry daemon.
//!
//! Runs the motion telemetry agent and exposes its command surface and sensor
//! feed over HTTP.
//!
//! # Environment
//!
//! - `TELEMETRY_PORT` - listen port (default 3000)
//! - `TELEMETRY_BASE_URL` - collector base URL
//! - `TELEMETRY_DEVICE_ID`, `TELEMETRY_OPERATOR`, `TELEMETRY_FORKLIFT_ID` - identity
//! - `TELEMETRY_API_TOKEN` - optional bearer token for the collector
//! - `TELEMETRY_UPLOAD_TIMEOUT_MS` - per-upload timeout
//! - `TELEMETRY_SESSION_VALID` - initial session validity
//! - `TELEMETRY_AUTOSTART` - start the agent immediately

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use forklift_telemetry::agent::TelemetryAgent;
use forklift_telemetry::api::{AppState, router};
use forklift_telemetry::clock::AgentClock;
use forklift_telemetry::config::{AgentConfig, AgentSettings};
use forklift_telemetry::session::SessionFlag;
use forklift_telemetry::sources::FeedSource;
use forklift_telemetry::uploader::{TelemetryClient, UploadContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("forklift_telemetry=info".parse()?))
        .init();

    let settings = AgentSettings::from_env()?;
    info!(
        port = settings.port,
        base_url = %settings.base_url,
        device_id = %settings.device_id,
        "Starting telemetry daemon"
    );

    let clock = AgentClock::new();
    let feed = Arc::new(FeedSource::new(clock));
    let session = Arc::new(SessionFlag::new(settings.session_valid));
    let client = TelemetryClient::from_settings(&settings)?;

    let agent = Arc::new(TelemetryAgent::new(
        AgentConfig::default(),
        UploadContext::from_settings(&settings),
        client,
        clock,
        feed.clone(),
        feed.clone(),
    ));

    if settings.autostart {
        let outcome = agent.start(session.clone()).await;
        info!(outcome = ?outcome, "Autostart");
    }

    let state = AppState {
        agent: Arc::clone(&agent),
        feed,
        session,
    };
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Telemetry daemon is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    agent.stop().await;
    info!("Telemetry daemon stopped");

    Ok(())
}
