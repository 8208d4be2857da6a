//! Latest-value signal cells written by sensor callbacks.
//!
//! No history is kept: each cell holds the most recent reading and every
//! write replaces it. The scheduler reads the cells once per tick.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::LocationFix;

/// Standard gravity, subtracted from the accelerometer norm.
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Kind of inertial sensor an event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Gyroscope,
    Accelerometer,
}

/// One raw inertial reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InertialEvent {
    pub sensor: SensorKind,

    /// Axis triplet in sensor units (rad/s or m/s²).
    pub values: [f64; 3],

    /// Sensor timestamp, informational only.
    #[serde(default)]
    pub timestamp_ns: i64,
}

impl InertialEvent {
    /// Scalar magnitude the classifier works with.
    ///
    /// Gyroscope: Euclidean norm. Accelerometer: absolute deviation of the
    /// norm from standard gravity, so a device at rest reads about zero.
    pub fn magnitude(&self) -> f64 {
        let [x, y, z] = self.values;
        let norm = (x * x + y * y + z * z).sqrt();
        match self.sensor {
            SensorKind::Gyroscope => norm,
            SensorKind::Accelerometer => (norm - STANDARD_GRAVITY).abs(),
        }
    }
}

/// A lock-free f64 cell.
#[derive(Debug, Default)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }
}

/// Most recent gyroscope and accelerometer magnitudes.
#[derive(Debug, Default)]
pub struct MotionSignal {
    gyro: AtomicF64,
    accel: AtomicF64,
}

/// A consistent-enough pair of magnitudes read at one point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionReading {
    pub gyro_magnitude: f64,
    pub accel_magnitude: f64,
}

impl MotionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reduce a raw event to its magnitude and store it in the matching cell.
    pub fn record(&self, event: &InertialEvent) {
        let magnitude = event.magnitude();
        match event.sensor {
            SensorKind::Gyroscope => self.gyro.store(magnitude),
            SensorKind::Accelerometer => self.accel.store(magnitude),
        }
    }

    pub fn set_gyro_magnitude(&self, value: f64) {
        self.gyro.store(value);
    }

    pub fn set_accel_magnitude(&self, value: f64) {
        self.accel.store(value);
    }

    pub fn read(&self) -> MotionReading {
        MotionReading {
            gyro_magnitude: self.gyro.load(),
            accel_magnitude: self.accel.load(),
        }
    }

    pub fn reset(&self) {
        self.gyro.store(0.0);
        self.accel.store(0.0);
    }
}

/// Latest location fix, replaced wholesale on every callback.
#[derive(Debug, Default)]
pub struct LocationCell {
    latest: Mutex<Option<LocationFix>>,
}

impl LocationCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, fix: LocationFix) {
        *self.latest.lock() = Some(fix);
    }

    pub fn latest(&self) -> Option<LocationFix> {
        self.latest.lock().clone()
    }

    pub fn clear(&self) {
        *self.latest.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gyro_magnitude_is_euclidean_norm() {
        let event = InertialEvent {
            sensor: SensorKind::Gyroscope,
            values: [3.0, 4.0, 0.0],
            timestamp_ns: 0,
        };
        assert!((event.magnitude() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_accel_magnitude_is_deviation_from_gravity() {
        let at_rest = InertialEvent {
            sensor: SensorKind::Accelerometer,
            values: [0.0, 0.0, 9.81],
            timestamp_ns: 0,
        };
        assert!(at_rest.magnitude().abs() < 1e-12);

        let free_fall = InertialEvent {
            sensor: SensorKind::Accelerometer,
            values: [0.0, 0.0, 0.0],
            timestamp_ns: 0,
        };
        assert!((free_fall.magnitude() - 9.81).abs() < 1e-12);
    }

    #[test]
    fn test_record_updates_only_matching_cell() {
        let signal = MotionSignal::new();
        signal.record(&InertialEvent {
            sensor: SensorKind::Gyroscope,
            values: [0.0, 0.3, 0.4],
            timestamp_ns: 1,
        });

        let reading = signal.read();
        assert!((reading.gyro_magnitude - 0.5).abs() < 1e-12);
        assert_eq!(reading.accel_magnitude, 0.0);

        signal.set_accel_magnitude(2.0);
        signal.set_gyro_magnitude(0.1);
        assert_eq!(
            signal.read(),
            MotionReading {
                gyro_magnitude: 0.1,
                accel_magnitude: 2.0
            }
        );

        signal.reset();
        assert_eq!(signal.read(), MotionReading::default());
    }

    #[test]
    fn test_location_cell_last_write_wins() {
        let cell = LocationCell::new();
        assert!(cell.latest().is_none());

        for i in 0..3 {
            cell.store(LocationFix {
                latitude: f64::from(i),
                longitude: 0.0,
                speed_mps: None,
                bearing_deg: None,
                altitude_m: None,
                accuracy_m: None,
                provider: None,
                captured_at_ms: i64::from(i),
            });
        }

        assert_eq!(cell.latest().unwrap().latitude, 2.0);
        cell.clear();
        assert!(cell.latest().is_none());
    }
}
