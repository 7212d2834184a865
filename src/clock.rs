//! Clock seam for event timestamps and durations
//!
//! Every timestamp the orchestrator emits is acquired through [`Clock`] so
//! tests can substitute a deterministic source.

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

/// Time source for workflow event timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation used in production wiring
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Steppable clock for deterministic tests
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward by the given amount
    pub fn advance(&self, delta: chrono::Duration) {
        let mut current = self.current.lock().expect("clock lock poisoned");
        *current += delta;
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        let mut current = self.current.lock().expect("clock lock poisoned");
        *current = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().expect("clock lock poisoned")
    }
}
