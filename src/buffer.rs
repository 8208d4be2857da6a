//! Ordered queue of samples awaiting upload.
//!
//! The buffer has no flush policy of its own; the scheduler decides when to
//! drain. A drain swaps the backing vector for an empty one under the lock,
//! so an append racing with a drain ends up in exactly one of the two.

use parking_lot::Mutex;

use crate::model::{Batch, TelemetrySample};

#[derive(Debug, Default)]
pub struct BatchBuffer {
    pending: Mutex<Vec<TelemetrySample>>,
}

impl BatchBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, sample: TelemetrySample) {
        self.pending.lock().push(sample);
    }

    /// Take every pending sample, leaving the buffer empty.
    pub fn drain(&self) -> Batch {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Drain only when at least `min_len` samples are pending.
    pub fn drain_at_least(&self, min_len: usize) -> Option<Batch> {
        let mut pending = self.pending.lock();
        if pending.is_empty() || pending.len() < min_len {
            return None;
        }
        Some(std::mem::take(&mut *pending))
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Discard everything pending and return how many samples were dropped.
    pub fn clear(&self) -> usize {
        self.drain().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MovementState;
    use chrono::Utc;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::thread;

    fn sample(sequence: u64) -> TelemetrySample {
        TelemetrySample {
            timestamp: Utc::now(),
            sequence,
            movement_state: MovementState::Unknown,
            confidence: 0.4,
            gyro_magnitude: 0.0,
            accel_magnitude: 0.0,
            gps_available: false,
            latitude: None,
            longitude: None,
            speed_mps: None,
            bearing_deg: None,
            accuracy_m: None,
            altitude_m: None,
            provider: None,
        }
    }

    #[test]
    fn test_drain_preserves_order_and_empties() {
        let buffer = BatchBuffer::new();
        for seq in 1..=4 {
            buffer.append(sample(seq));
        }

        let batch = buffer.drain();

        let seqs: Vec<u64> = batch.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_drain_at_least() {
        let buffer = BatchBuffer::new();
        assert!(buffer.drain_at_least(0).is_none());

        buffer.append(sample(1));
        assert!(buffer.drain_at_least(2).is_none());
        assert_eq!(buffer.len(), 1);

        buffer.append(sample(2));
        assert_eq!(buffer.drain_at_least(2).unwrap().len(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear_reports_dropped_count() {
        let buffer = BatchBuffer::new();
        buffer.append(sample(1));
        buffer.append(sample(2));

        assert_eq!(buffer.clear(), 2);
        assert_eq!(buffer.clear(), 0);
    }

    #[test]
    fn test_concurrent_appends_and_drains_lose_nothing() {
        const WRITERS: u64 = 4;
        const PER_WRITER: u64 = 2_000;

        let buffer = Arc::new(BatchBuffer::new());

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..PER_WRITER {
                        buffer.append(sample(w * PER_WRITER + i));
                    }
                })
            })
            .collect();

        let drainer = {
            let buffer = Arc::clone(&buffer);
            thread::spawn(move || {
                let mut drained = Vec::new();
                for _ in 0..200 {
                    drained.extend(buffer.drain());
                    thread::yield_now();
                }
                drained
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        let mut seen: Vec<u64> = drainer.join().unwrap().iter().map(|s| s.sequence).collect();
        seen.extend(buffer.drain().iter().map(|s| s.sequence));

        let unique: BTreeSet<u64> = seen.iter().copied().collect();
        assert_eq!(seen.len() as u64, WRITERS * PER_WRITER);
        assert_eq!(unique.len() as u64, WRITERS * PER_WRITER);
    }
}
