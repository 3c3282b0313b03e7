//! Time source abstraction: the live runtime reads the wall clock,
//! replay owns a virtual clock the driver advances bar by bar.

use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default)]
pub struct WallClock;

impl Clock for WallClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Replay clock. The backtest driver moves it forward monotonically;
/// everything downstream (lag checks, boundary monitor, quality)
/// reads it exactly like the wall clock.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now_ms: AtomicI64,
}

impl VirtualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
        }
    }

    pub fn advance_to(&self, timestamp_ms: i64) {
        self.now_ms.fetch_max(timestamp_ms, Ordering::SeqCst);
    }

    pub fn set(&self, timestamp_ms: i64) {
        self.now_ms.store(timestamp_ms, Ordering::SeqCst);
    }
}

impl Clock for VirtualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_clock_advances_monotonically() {
        let clock = VirtualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);

        clock.advance_to(5_000);
        assert_eq!(clock.now_ms(), 5_000);

        // advance_to never moves backwards
        clock.advance_to(2_000);
        assert_eq!(clock.now_ms(), 5_000);

        // set does
        clock.set(2_000);
        assert_eq!(clock.now_ms(), 2_000);
    }
}
