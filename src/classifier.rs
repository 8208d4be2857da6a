//! Hysteresis-based movement classification.
//!
//! A reading is a *moving-candidate* when either magnitude exceeds its
//! threshold, and an *idle-candidate* when both sit below 70% of their
//! thresholds. Readings between the two bands leave the candidate timers
//! untouched. A state is only accepted once its candidate has been observed
//! for the configured dwell time, so a single threshold crossing never causes
//! a transition on its own.

use crate::config::AgentConfig;
use crate::model::MovementState;

/// Fraction of each threshold below which a reading counts toward idle.
pub const IDLE_BAND_RATIO: f64 = 0.7;

#[derive(Debug, Clone, Default)]
pub struct MotionClassifier {
    state: MovementState,
    moving_since_ms: Option<i64>,
    idle_since_ms: Option<i64>,
}

impl MotionClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state without observing anything.
    pub fn state(&self) -> MovementState {
        self.state
    }

    /// Feed one tick's magnitudes and return the resulting state.
    ///
    /// Call once per sampling tick, not per raw sensor event.
    pub fn observe(
        &mut self,
        gyro_magnitude: f64,
        accel_magnitude: f64,
        now_ms: i64,
        config: &AgentConfig,
    ) -> MovementState {
        let moving_candidate =
            gyro_magnitude > config.gyro_threshold || accel_magnitude > config.accel_threshold;
        let idle_candidate = gyro_magnitude < config.gyro_threshold * IDLE_BAND_RATIO
            && accel_magnitude < config.accel_threshold * IDLE_BAND_RATIO;

        if moving_candidate {
            self.moving_since_ms.get_or_insert(now_ms);
            self.idle_since_ms = None;
        } else if idle_candidate {
            self.idle_since_ms.get_or_insert(now_ms);
            self.moving_since_ms = None;
        }

        if dwell_reached(self.moving_since_ms, now_ms, config.move_min_ms) {
            self.state = MovementState::Moving;
        } else if dwell_reached(self.idle_since_ms, now_ms, config.stop_min_ms) {
            self.state = MovementState::Idle;
        }

        self.state
    }

    /// Back to `Unknown` with no pending evidence.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn dwell_reached(since_ms: Option<i64>, now_ms: i64, min_ms: u64) -> bool {
    let min_ms = i64::try_from(min_ms).unwrap_or(i64::MAX);
    since_ms.is_some_and(|since| now_ms.saturating_sub(since) >= min_ms)
}
