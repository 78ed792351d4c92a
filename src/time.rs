//! Time sources for the timeout scheduler.
//!
//! The scheduler never reads the wall clock directly. Production code uses
//! [`MonotonicTime`]; tests and the simulator drive a [`ManualTime`] so that
//! retry behaviour can be exercised without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic microsecond clock.
pub trait TimeSource: Send + Sync {
    /// Microseconds since an arbitrary, fixed origin.
    fn now_us(&self) -> u64;

    /// Microseconds elapsed since `reference_us`, saturating at zero.
    fn elapsed_since(&self, reference_us: u64) -> u64 {
        self.now_us().saturating_sub(reference_us)
    }
}

/// Clock backed by [`Instant`], starting at zero on construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now_us(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// Manually advanced time source backed by a shared atomic counter.
///
/// Clones share the same counter, so a test can hold one handle and advance
/// time while the engine reads it through another.
#[derive(Debug, Clone, Default)]
pub struct ManualTime {
    time_us: Arc<AtomicU64>,
}

impl ManualTime {
    /// Create a new time source starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance time by the given number of microseconds.
    pub fn advance_us(&self, us: u64) {
        self.time_us.fetch_add(us, Ordering::Relaxed);
    }

    /// Advance time by a [`Duration`].
    pub fn advance(&self, duration: Duration) {
        self.advance_us(duration_to_us(duration));
    }

    /// Set time to an absolute value.
    pub fn set_us(&self, us: u64) {
        self.time_us.store(us, Ordering::Relaxed);
    }
}

impl TimeSource for ManualTime {
    fn now_us(&self) -> u64 {
        self.time_us.load(Ordering::Relaxed)
    }
}

pub(crate) fn duration_to_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}
