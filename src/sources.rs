//! Signal source collaborators.
//!
//! The agent never polls hardware. It hands its signal cells to an
//! [`InertialSource`] and a [`LocationSource`] when it starts, and the
//! sources write into them from their own callbacks until unsubscribed.
//!
//! [`FeedSource`] implements both traits for readings pushed from outside
//! the process (the daemon's `/sensors/*` routes).

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::AgentClock;
use crate::model::LocationFix;
use crate::signal::{InertialEvent, LocationCell, MotionSignal};

/// Provider name recorded for pushed fixes that do not carry one.
pub const DEFAULT_PROVIDER: &str = "fused";

/// Delivers inertial events into a [`MotionSignal`].
pub trait InertialSource: Send + Sync {
    fn subscribe(&self, sink: Arc<MotionSignal>);
    fn unsubscribe(&self);
}

/// Delivers position fixes into a [`LocationCell`] at a requested cadence.
pub trait LocationSource: Send + Sync {
    fn request_updates(&self, request: LocationRequest, sink: Arc<LocationCell>);
    fn remove_updates(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationPriority {
    HighAccuracy,
}

/// Parameters of a location subscription.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationRequest {
    pub priority: LocationPriority,
    pub interval_ms: u64,
    pub min_interval_ms: u64,
    pub min_displacement_m: f32,
}

/// A position reading as delivered by an external provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationReading {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed_mps: Option<f32>,
    #[serde(default)]
    pub bearing_deg: Option<f32>,
    #[serde(default)]
    pub altitude_m: Option<f32>,
    #[serde(default)]
    pub accuracy_m: Option<f32>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl LocationReading {
    /// Stamp the reading with its arrival time.
    pub fn into_fix(self, captured_at_ms: i64) -> LocationFix {
        LocationFix {
            latitude: self.latitude,
            longitude: self.longitude,
            speed_mps: self.speed_mps,
            bearing_deg: self.bearing_deg,
            altitude_m: self.altitude_m,
            accuracy_m: self.accuracy_m,
            provider: Some(
                self.provider
                    .unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            ),
            captured_at_ms,
        }
    }
}

#[derive(Default)]
struct LocationSubscription {
    request: Option<LocationRequest>,
    sink: Option<Arc<LocationCell>>,
}

/// Source fed by readings pushed from outside the agent.
///
/// Readings arriving while nobody is subscribed are rejected.
pub struct FeedSource {
    clock: AgentClock,
    inertial: Mutex<Option<Arc<MotionSignal>>>,
    location: Mutex<LocationSubscription>,
}

impl FeedSource {
    pub fn new(clock: AgentClock) -> Self {
        Self {
            clock,
            inertial: Mutex::new(None),
            location: Mutex::new(LocationSubscription::default()),
        }
    }

    /// Push an inertial event. Returns false when no one is subscribed.
    pub fn push_inertial(&self, event: &InertialEvent) -> bool {
        match self.inertial.lock().as_ref() {
            Some(sink) => {
                sink.record(event);
                true
            }
            None => false,
        }
    }

    /// Push a position reading. Returns false when updates are not requested.
    pub fn push_location(&self, reading: LocationReading) -> bool {
        let sink = self.location.lock().sink.clone();
        match sink {
            Some(sink) => {
                sink.store(reading.into_fix(self.clock.now_ms()));
                true
            }
            None => false,
        }
    }

    /// The currently active location request, if any.
    pub fn location_request(&self) -> Option<LocationRequest> {
        self.location.lock().request
    }

    pub fn is_inertial_subscribed(&self) -> bool {
        self.inertial.lock().is_some()
    }
}

impl InertialSource for FeedSource {
    fn subscribe(&self, sink: Arc<MotionSignal>) {
        *self.inertial.lock() = Some(sink);
        debug!("Inertial feed subscribed");
    }

    fn unsubscribe(&self) {
        *self.inertial.lock() = None;
        debug!("Inertial feed unsubscribed");
    }
}

impl LocationSource for FeedSource {
    fn request_updates(&self, request: LocationRequest, sink: Arc<LocationCell>) {
        let mut subscription = self.location.lock();
        subscription.request = Some(request);
        subscription.sink = Some(sink);
        info!(
            interval_ms = request.interval_ms,
            min_interval_ms = request.min_interval_ms,
            "Location updates requested"
        );
    }

    fn remove_updates(&self) {
        *self.location.lock() = LocationSubscription::default();
        debug!("Location updates removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SensorKind;

    fn request(interval_ms: u64) -> LocationRequest {
        LocationRequest {
            priority: LocationPriority::HighAccuracy,
            interval_ms,
            min_interval_ms: 2_000,
            min_displacement_m: 4.0,
        }
    }

    #[test]
    fn test_inertial_push_requires_subscription() {
        let feed = FeedSource::new(AgentClock::starting_at(0));
        let signal = Arc::new(MotionSignal::new());
        let event = InertialEvent {
            sensor: SensorKind::Gyroscope,
            values: [0.0, 0.0, 0.2],
            timestamp_ns: 0,
        };

        assert!(!feed.push_inertial(&event));

        feed.subscribe(Arc::clone(&signal));
        assert!(feed.push_inertial(&event));
        assert!((signal.read().gyro_magnitude - 0.2).abs() < 1e-12);

        feed.unsubscribe();
        assert!(!feed.push_inertial(&event));
    }

    #[tokio::test]
    async fn test_location_push_is_stamped_and_defaults_provider() {
        let feed = FeedSource::new(AgentClock::starting_at(5_000));
        let cell = Arc::new(LocationCell::new());
        let reading = LocationReading {
            latitude: 1.0,
            longitude: 2.0,
            speed_mps: None,
            bearing_deg: None,
            altitude_m: None,
            accuracy_m: Some(3.0),
            provider: None,
        };

        assert!(!feed.push_location(reading.clone()));

        feed.request_updates(request(4_000), Arc::clone(&cell));
        assert_eq!(feed.location_request().unwrap().interval_ms, 4_000);
        assert!(feed.push_location(reading));

        let fix = cell.latest().unwrap();
        assert!(fix.captured_at_ms >= 5_000);
        assert_eq!(fix.provider.as_deref(), Some(DEFAULT_PROVIDER));

        feed.remove_updates();
        assert!(feed.location_request().is_none());
    }
}
