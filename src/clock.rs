//! Monotonic time source for deadlines.
//!
//! - [`MonotonicClock`] wraps `std::time::Instant` for production use.
//! - [`ManualClock`] only moves when told to, for deterministic timeout
//!   tests and simulations.

use core::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Port trait: the dispatcher asks this for "now" when stamping and
/// sweeping deadlines.
pub trait Clock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin (monotonic).
    fn now_ms(&self) -> u64;
}

/// Wall-independent monotonic clock.
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock.
#[derive(Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now_ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
