//! Delivery of telemetry batches to the collector.
//!
//! Delivery is at-most-once: a failed upload is not retried and its batch is
//! gone. The collector may or may not have recorded it.

use std::future::Future;
use std::time::Duration;

use tracing::debug;

use crate::config::AgentSettings;
use crate::error::UploadError;
use crate::model::{Batch, SCHEMA_VERSION, TelemetryRequest, TelemetryResponse};

/// Path of the telemetry endpoint under the collector base URL.
pub const TELEMETRY_PATH: &str = "/forklift/telemetry";

/// Sends one request to the collector.
pub trait Uploader: Send + Sync + 'static {
    fn upload(
        &self,
        request: &TelemetryRequest,
    ) -> impl Future<Output = Result<TelemetryResponse, UploadError>> + Send;
}

/// Device identity stamped on every request.
#[derive(Debug, Clone)]
pub struct UploadContext {
    pub device_id: String,
    pub operator_id: String,
    pub asset_id: Option<String>,
    pub app_version: String,
}

impl UploadContext {
    pub fn from_settings(settings: &AgentSettings) -> Self {
        Self {
            device_id: settings.device_id.clone(),
            operator_id: settings.operator_id.clone(),
            asset_id: settings.asset_id.clone(),
            app_version: settings.app_version.clone(),
        }
    }

    /// Wrap a drained batch in the wire envelope.
    pub fn request(&self, samples: Batch) -> TelemetryRequest {
        TelemetryRequest {
            device_id: self.device_id.clone(),
            operator_id: self.operator_id.clone(),
            asset_id: self.asset_id.clone(),
            app_version: self.app_version.clone(),
            schema_version: SCHEMA_VERSION,
            samples,
        }
    }
}

/// HTTP client for the collector's telemetry endpoint.
#[derive(Clone)]
pub struct TelemetryClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl TelemetryClient {
    /// Create a client for `base_url` (e.g. `https://host/api`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UploadError::Transport)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Create a client from daemon settings.
    pub fn from_settings(settings: &AgentSettings) -> Result<Self, UploadError> {
        let client = Self::new(&settings.base_url, settings.upload_timeout)?;
        Ok(match &settings.api_token {
            Some(token) => client.with_bearer_token(token),
            None => client,
        })
    }

    pub fn with_bearer_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, TELEMETRY_PATH)
    }
}

impl Uploader for TelemetryClient {
    async fn upload(&self, request: &TelemetryRequest) -> Result<TelemetryResponse, UploadError> {
        let url = self.endpoint();
        debug!(url = %url, samples = request.samples.len(), "Posting telemetry batch");

        let mut builder = self.client.post(&url).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(UploadError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json::<TelemetryResponse>()
            .await
            .map_err(UploadError::Decode)
    }
}
