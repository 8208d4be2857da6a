//! Builds immutable telemetry samples from the live signal cells.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::clock::AgentClock;
use crate::config::AgentConfig;
use crate::model::{LocationFix, MovementState, TelemetrySample};
use crate::signal::{LocationCell, MotionSignal};

/// Fixes older than this are ignored.
pub const MAX_FIX_AGE_MS: i64 = 30_000;

/// Monotonic sequence source. Starts at 1.
#[derive(Debug, Clone)]
pub struct SequenceCounter(Arc<AtomicU64>);

impl Default for SequenceCounter {
    fn default() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    /// Last number handed out, 0 if none yet.
    pub fn last(&self) -> u64 {
        self.0.load(Ordering::SeqCst) - 1
    }
}

pub struct SampleBuilder {
    signal: Arc<MotionSignal>,
    location: Arc<LocationCell>,
    sequence: SequenceCounter,
    last_built_ms: Option<i64>,
}

impl SampleBuilder {
    pub fn new(
        signal: Arc<MotionSignal>,
        location: Arc<LocationCell>,
        sequence: SequenceCounter,
    ) -> Self {
        Self {
            signal,
            location,
            sequence,
            last_built_ms: None,
        }
    }

    /// Whether a sample may be built at `now_ms` without double-sampling.
    pub fn is_due(&self, now_ms: i64, config: &AgentConfig) -> bool {
        self.last_built_ms
            .is_none_or(|last| now_ms - last >= config.sample_interval_ms as i64)
    }

    /// Build the next sample, or `None` when called before the cadence allows.
    pub fn build(
        &mut self,
        now_ms: i64,
        state: MovementState,
        config: &AgentConfig,
    ) -> Option<TelemetrySample> {
        if !self.is_due(now_ms, config) {
            return None;
        }
        self.last_built_ms = Some(now_ms);

        let reading = self.signal.read();
        let fix = self
            .location
            .latest()
            .filter(|fix| fix_is_usable(fix, now_ms, state));
        let gps_available = fix.is_some();
        let fix = fix.as_ref();

        Some(TelemetrySample {
            timestamp: AgentClock::to_utc(now_ms),
            sequence: self.sequence.next(),
            movement_state: state,
            confidence: state.confidence(),
            gyro_magnitude: reading.gyro_magnitude,
            accel_magnitude: reading.accel_magnitude,
            gps_available,
            latitude: fix.map(|f| f.latitude),
            longitude: fix.map(|f| f.longitude),
            speed_mps: fix.and_then(|f| f.speed_mps),
            bearing_deg: fix.and_then(|f| f.bearing_deg),
            accuracy_m: fix.and_then(|f| f.accuracy_m),
            altitude_m: fix.and_then(|f| f.altitude_m),
            provider: fix.and_then(|f| f.provider.clone()),
        })
    }
}

/// Fresh enough and, if accuracy is reported, accurate enough for `state`.
pub fn fix_is_usable(fix: &LocationFix, now_ms: i64, state: MovementState) -> bool {
    if fix.age_ms(now_ms) >= MAX_FIX_AGE_MS {
        return false;
    }
    fix.accuracy_m
        .is_none_or(|accuracy| accuracy <= state.accuracy_ceiling_m())
}
