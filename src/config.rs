//! Tunable agent parameters and daemon settings.
//!
//! [`AgentConfig`] holds everything the collector may retune at runtime. It is
//! never mutated in place: [`ConfigStore`] swaps whole snapshots, so a
//! classification pass that took a snapshot keeps a consistent view even if
//! an upload response lands mid-tick.
//!
//! [`AgentSettings`] is the static identity and transport setup read once
//! from the environment when the daemon starts.

use std::env;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

use crate::error::AgentError;
use crate::model::{ConfigUpdate, MovementState};

/// Runtime-tunable parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentConfig {
    /// Gyroscope magnitude above which a reading is a moving-candidate (rad/s).
    pub gyro_threshold: f64,

    /// Accelerometer deviation above which a reading is a moving-candidate (m/s²).
    pub accel_threshold: f64,

    /// Dwell required before accepting `Moving`.
    pub move_min_ms: u64,

    /// Dwell required before accepting `Idle`.
    pub stop_min_ms: u64,

    /// Location request interval while moving.
    pub location_moving_ms: u64,

    /// Location request interval while idle or unknown.
    pub location_idle_ms: u64,

    /// Fastest rate at which the location source may deliver fixes.
    pub location_fastest_ms: u64,

    /// Minimum displacement between delivered fixes.
    pub location_min_displacement_m: f32,

    /// Upload period while moving. Replaced by the collector's
    /// `next_upload_in_ms` suggestion.
    pub upload_moving_ms: u64,

    /// Upload period while idle or unknown.
    pub upload_idle_ms: u64,

    /// Sampling cadence. Fixed for the lifetime of a run.
    pub sample_interval_ms: u64,

    /// Periodic uploads wait for at least this many pending samples.
    pub periodic_min_batch: usize,

    /// Sensor rate last requested by the collector. Reported only.
    pub sampling_hz: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            gyro_threshold: 0.18,
            accel_threshold: 1.4,
            move_min_ms: 1_500,
            stop_min_ms: 3_000,
            location_moving_ms: 4_000,
            location_idle_ms: 20_000,
            location_fastest_ms: 2_000,
            location_min_displacement_m: 4.0,
            upload_moving_ms: 10_000,
            upload_idle_ms: 30_000,
            sample_interval_ms: 1_000,
            periodic_min_batch: 2,
            sampling_hz: None,
        }
    }
}

impl AgentConfig {
    /// Upload period for the given movement state.
    pub fn upload_period_ms(&self, state: MovementState) -> u64 {
        match state {
            MovementState::Moving => self.upload_moving_ms,
            MovementState::Idle | MovementState::Unknown => self.upload_idle_ms,
        }
    }

    /// Location request interval for the given movement state.
    pub fn location_interval_ms(&self, state: MovementState) -> u64 {
        match state {
            MovementState::Moving => self.location_moving_ms,
            MovementState::Idle | MovementState::Unknown => self.location_idle_ms,
        }
    }

    /// Return a copy with every field present in `update` applied.
    ///
    /// A positive `next_upload_ms` replaces the moving upload period.
    pub fn merged(&self, update: Option<&ConfigUpdate>, next_upload_ms: i64) -> Self {
        let mut next = self.clone();

        if let Some(update) = update {
            if let Some(v) = update.gyro_threshold {
                next.gyro_threshold = v;
            }
            if let Some(v) = update.accel_threshold {
                next.accel_threshold = v;
            }
            if let Some(v) = update.move_min_ms {
                next.move_min_ms = v;
            }
            if let Some(v) = update.stop_min_ms {
                next.stop_min_ms = v;
            }
            if let Some(v) = update.location_moving_ms {
                next.location_moving_ms = v;
            }
            if let Some(v) = update.location_idle_ms {
                next.location_idle_ms = v;
            }
            if update.sampling_hz.is_some() {
                next.sampling_hz = update.sampling_hz;
            }
        }

        if next_upload_ms > 0 {
            next.upload_moving_ms = next_upload_ms as u64;
        }

        next
    }
}

/// Copy-on-write holder for the live [`AgentConfig`].
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Arc<AgentConfig>>,
}

impl ConfigStore {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
        }
    }

    /// Cheap snapshot of the current config.
    pub fn snapshot(&self) -> Arc<AgentConfig> {
        Arc::clone(&self.current.read())
    }

    /// Replace the whole config.
    pub fn replace(&self, config: AgentConfig) {
        *self.current.write() = Arc::new(config);
    }

    /// Merge a collector response and return the new snapshot.
    pub fn apply(&self, update: Option<&ConfigUpdate>, next_upload_ms: i64) -> Arc<AgentConfig> {
        let mut guard = self.current.write();
        let next = Arc::new(guard.merged(update, next_upload_ms));
        *guard = Arc::clone(&next);
        next
    }
}

/// Default collector base URL.
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/api";

/// Default daemon port.
const DEFAULT_PORT: u16 = 3000;

/// Default upload request timeout.
const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 15_000;

/// Static identity and transport settings.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub port: u16,
    pub base_url: String,
    pub device_id: String,
    pub operator_id: String,
    pub asset_id: Option<String>,
    pub app_version: String,
    pub api_token: Option<String>,
    pub upload_timeout: Duration,
    pub session_valid: bool,
    pub autostart: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            base_url: DEFAULT_BASE_URL.to_string(),
            device_id: "unknown-device".to_string(),
            operator_id: "unknown".to_string(),
            asset_id: None,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            api_token: None,
            upload_timeout: Duration::from_millis(DEFAULT_UPLOAD_TIMEOUT_MS),
            session_valid: true,
            autostart: true,
        }
    }
}

impl AgentSettings {
    /// Load settings from `TELEMETRY_*` environment variables.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load settings through an arbitrary lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AgentError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            port: parse_or("TELEMETRY_PORT", non_empty("TELEMETRY_PORT"), defaults.port)?,
            base_url: non_empty("TELEMETRY_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            device_id: non_empty("TELEMETRY_DEVICE_ID").unwrap_or(defaults.device_id),
            operator_id: non_empty("TELEMETRY_OPERATOR").unwrap_or(defaults.operator_id),
            asset_id: non_empty("TELEMETRY_FORKLIFT_ID"),
            app_version: defaults.app_version,
            api_token: non_empty("TELEMETRY_API_TOKEN"),
            upload_timeout: Duration::from_millis(parse_or(
                "TELEMETRY_UPLOAD_TIMEOUT_MS",
                non_empty("TELEMETRY_UPLOAD_TIMEOUT_MS"),
                DEFAULT_UPLOAD_TIMEOUT_MS,
            )?),
            session_valid: parse_or(
                "TELEMETRY_SESSION_VALID",
                non_empty("TELEMETRY_SESSION_VALID"),
                defaults.session_valid,
            )?,
            autostart: parse_or(
                "TELEMETRY_AUTOSTART",
                non_empty("TELEMETRY_AUTOSTART"),
                defaults.autostart,
            )?,
        })
    }
}

fn parse_or<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, AgentError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| AgentError::InvalidSetting { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_merge_keeps_absent_fields() {
        let base = AgentConfig::default();
        let update = ConfigUpdate {
            move_min_ms: Some(500),
            gyro_threshold: Some(0.25),
            ..ConfigUpdate::default()
        };

        let merged = base.merged(Some(&update), 0);

        assert_eq!(merged.move_min_ms, 500);
        assert_eq!(merged.gyro_threshold, 0.25);
        assert_eq!(merged.accel_threshold, base.accel_threshold);
        assert_eq!(merged.stop_min_ms, base.stop_min_ms);
        assert_eq!(merged.upload_moving_ms, base.upload_moving_ms);
    }

    #[test]
    fn test_next_upload_overrides_moving_period_only_when_positive() {
        let base = AgentConfig::default();

        assert_eq!(base.merged(None, 4_000).upload_moving_ms, 4_000);
        assert_eq!(base.merged(None, 0).upload_moving_ms, 10_000);
        assert_eq!(base.merged(None, -5).upload_moving_ms, 10_000);
        assert_eq!(base.merged(None, 4_000).upload_idle_ms, 30_000);
    }

    #[test]
    fn test_store_snapshot_is_stable_across_apply() {
        let store = ConfigStore::new(AgentConfig::default());
        let before = store.snapshot();

        let update = ConfigUpdate {
            stop_min_ms: Some(9_000),
            ..ConfigUpdate::default()
        };
        let after = store.apply(Some(&update), 0);

        assert_eq!(before.stop_min_ms, 3_000);
        assert_eq!(after.stop_min_ms, 9_000);
        assert_eq!(store.snapshot().stop_min_ms, 9_000);
    }

    #[test]
    fn test_periods_follow_state() {
        let config = AgentConfig::default();

        assert_eq!(config.upload_period_ms(MovementState::Moving), 10_000);
        assert_eq!(config.upload_period_ms(MovementState::Idle), 30_000);
        assert_eq!(config.upload_period_ms(MovementState::Unknown), 30_000);
        assert_eq!(config.location_interval_ms(MovementState::Moving), 4_000);
        assert_eq!(config.location_interval_ms(MovementState::Unknown), 20_000);
    }

    #[test]
    fn test_settings_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("TELEMETRY_PORT", "8088"),
            ("TELEMETRY_BASE_URL", "https://collector.local/api/"),
            ("TELEMETRY_DEVICE_ID", "android-42"),
            ("TELEMETRY_FORKLIFT_ID", "FL-07"),
            ("TELEMETRY_SESSION_VALID", "false"),
        ]);

        let settings =
            AgentSettings::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();

        assert_eq!(settings.port, 8088);
        assert_eq!(settings.base_url, "https://collector.local/api");
        assert_eq!(settings.device_id, "android-42");
        assert_eq!(settings.operator_id, "unknown");
        assert_eq!(settings.asset_id.as_deref(), Some("FL-07"));
        assert!(!settings.session_valid);
        assert!(settings.autostart);
    }

    #[test]
    fn test_settings_rejects_bad_number() {
        let result = AgentSettings::from_lookup(|name| {
            (name == "TELEMETRY_UPLOAD_TIMEOUT_MS").then(|| "soon".to_string())
        });

        assert!(matches!(
            result,
            Err(AgentError::InvalidSetting {
                name: "TELEMETRY_UPLOAD_TIMEOUT_MS",
                ..
            })
        ));
    }
}
