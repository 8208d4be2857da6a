//! Millisecond clock shared by the scheduler and the signal feeds.
//!
//! Wall-clock time is captured once and advanced with the tokio monotonic
//! clock, so ticks are evenly spaced and tests can drive time with a paused
//! runtime.

use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct AgentClock {
    wall_base_ms: i64,
    origin: Instant,
}

impl Default for AgentClock {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now().timestamp_millis())
    }

    /// Clock whose current reading is `wall_base_ms`.
    pub fn starting_at(wall_base_ms: i64) -> Self {
        Self {
            wall_base_ms,
            origin: Instant::now(),
        }
    }

    /// Current time in Unix millis.
    pub fn now_ms(&self) -> i64 {
        self.at(Instant::now())
    }

    /// Unix millis corresponding to a monotonic instant.
    pub fn at(&self, instant: Instant) -> i64 {
        let elapsed = instant.saturating_duration_since(self.origin);
        self.wall_base_ms + elapsed.as_millis() as i64
    }

    /// Convert Unix millis to a UTC timestamp.
    pub fn to_utc(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}
