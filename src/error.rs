//! Error types for the telemetry agent.
//!
//! Nothing here crosses the scheduling boundary: periodic tasks log these and
//! carry on. They surface only to direct callers of the uploader and to the
//! daemon while it reads its settings.

use thiserror::Error;

/// Failure of a single upload attempt. The batch is dropped either way.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Connection, timeout or other transport failure.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("collector returned HTTP {status}")]
    Status { status: u16 },

    /// The response body was not a valid telemetry response.
    #[error("malformed collector response: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Daemon setup errors.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid value {value:?} for setting {name}")]
    InvalidSetting { name: &'static str, value: String },
}
