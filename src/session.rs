//! Session capability consulted before starting and before each upload.

use std::sync::atomic::{AtomicBool, Ordering};

/// Whether the operator session currently allows telemetry.
pub trait SessionGate: Send + Sync {
    fn is_valid(&self) -> bool;
}

/// A session flag flipped by whoever owns the login state.
#[derive(Debug)]
pub struct SessionFlag(AtomicBool);

impl SessionFlag {
    pub fn new(valid: bool) -> Self {
        Self(AtomicBool::new(valid))
    }

    pub fn set_valid(&self, valid: bool) {
        self.0.store(valid, Ordering::SeqCst);
    }
}

impl SessionGate for SessionFlag {
    fn is_valid(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
