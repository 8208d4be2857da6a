//! Data models for the telemetry agent.
//!
//! Two families of types live here:
//!
//! - Domain values produced on the device: [`MovementState`], [`LocationFix`]
//!   and the immutable [`TelemetrySample`].
//! - The upload wire contract: [`TelemetryRequest`], [`TelemetryResponse`] and
//!   the partial [`ConfigUpdate`] the collector may send back.
//!
//! Wire field names are fixed by the collector and must not change.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Version of the upload payload layout.
pub const SCHEMA_VERSION: u32 = 1;

/// Coarse classification of device motion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementState {
    /// No sustained evidence either way yet (startup state).
    #[default]
    Unknown,

    /// Sustained rotation or acceleration above threshold.
    Moving,

    /// Sustained readings below the idle band.
    Idle,
}

impl MovementState {
    /// Fixed trust signal attached to every sample built in this state.
    pub fn confidence(&self) -> f64 {
        match self {
            MovementState::Moving => 0.8,
            MovementState::Idle => 0.6,
            MovementState::Unknown => 0.4,
        }
    }

    /// Maximum accepted fix accuracy radius in meters.
    ///
    /// Position error matters more at speed, so moving demands a tighter fix.
    pub fn accuracy_ceiling_m(&self) -> f32 {
        match self {
            MovementState::Moving => 25.0,
            MovementState::Idle | MovementState::Unknown => 50.0,
        }
    }

    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementState::Unknown => "unknown",
            MovementState::Moving => "moving",
            MovementState::Idle => "idle",
        }
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            MovementState::Unknown => 0,
            MovementState::Moving => 1,
            MovementState::Idle => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => MovementState::Moving,
            2 => MovementState::Idle,
            _ => MovementState::Unknown,
        }
    }
}

/// The most recent position fix delivered by the location source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: Option<f32>,
    pub bearing_deg: Option<f32>,
    pub altitude_m: Option<f32>,
    /// Estimated horizontal accuracy radius. `None` when the provider
    /// does not report one.
    pub accuracy_m: Option<f32>,
    pub provider: Option<String>,
    /// Agent clock time (Unix millis) at which the fix was received.
    pub captured_at_ms: i64,
}

impl LocationFix {
    /// Age of the fix relative to `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.captured_at_ms
    }
}

/// One immutable telemetry observation.
///
/// Location fields are present iff `gps_available` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    #[serde(rename = "ts", serialize_with = "serialize_millis_utc")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "seq")]
    pub sequence: u64,

    pub movement_state: MovementState,

    #[serde(rename = "motion_confidence")]
    pub confidence: f64,

    #[serde(rename = "gyro_mag_rad_s")]
    pub gyro_magnitude: f64,

    #[serde(rename = "accel_mag_mps2")]
    pub accel_magnitude: f64,

    pub gps_available: bool,

    #[serde(rename = "lat", default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,

    #[serde(rename = "lon", default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_mps: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing_deg: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_m: Option<f32>,

    #[serde(rename = "alt_m", default, skip_serializing_if = "Option::is_none")]
    pub altitude_m: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

/// The collector expects `yyyy-MM-ddTHH:mm:ss.SSSZ`.
fn serialize_millis_utc<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// An ordered snapshot of the samples pending at flush time.
pub type Batch = Vec<TelemetrySample>;

/// Request body for `POST /forklift/telemetry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRequest {
    pub device_id: String,

    #[serde(rename = "operator_barcode")]
    pub operator_id: String,

    #[serde(rename = "forklift_id", default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<String>,

    pub app_version: String,

    pub schema_version: u32,

    pub samples: Batch,
}

/// Collector response to an accepted upload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryResponse {
    /// Number of samples the collector stored.
    #[serde(default, deserialize_with = "null_as_default")]
    pub accepted: u32,

    /// Collector clock at response time.
    #[serde(default)]
    pub server_time: Option<String>,

    /// Suggested delay before the next upload while moving. Zero or
    /// negative means no suggestion.
    #[serde(default, deserialize_with = "null_as_default")]
    pub next_upload_in_ms: i64,

    /// Optional partial reconfiguration.
    #[serde(default)]
    pub config: Option<ConfigUpdate>,
}

/// Decode an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Partial configuration pushed by the collector. Absent fields keep their
/// current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    #[serde(rename = "gyro_threshold_rad_s", default, skip_serializing_if = "Option::is_none")]
    pub gyro_threshold: Option<f64>,

    #[serde(rename = "accel_threshold_mps2", default, skip_serializing_if = "Option::is_none")]
    pub accel_threshold: Option<f64>,

    #[serde(rename = "move_min_duration_ms", default, skip_serializing_if = "Option::is_none")]
    pub move_min_ms: Option<u64>,

    #[serde(rename = "stop_min_duration_ms", default, skip_serializing_if = "Option::is_none")]
    pub stop_min_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_hz: Option<u32>,

    #[serde(rename = "location_interval_moving_ms", default, skip_serializing_if = "Option::is_none")]
    pub location_moving_ms: Option<u64>,

    #[serde(rename = "location_interval_idle_ms", default, skip_serializing_if = "Option::is_none")]
    pub location_idle_ms: Option<u64>,
}

impl ConfigUpdate {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == ConfigUpdate::default()
    }
}
