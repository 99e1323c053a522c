//! A `Clock` seam so periodic-worker logic (link-state aging, DHT
//! republish/expire, routing recomputation) can be tested without sleeping
//! real wall-clock seconds.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of "now", abstracted so tests can advance time deterministically.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> u64;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs()
    }
}

/// A manually-advanced clock for tests exercising `LS_TIMEO`,
/// `RECALC_TIME`, DHT expiry, and similar timers without real sleeps.
#[derive(Debug, Clone)]
pub struct TestClock {
    secs: Arc<AtomicU64>,
}

impl TestClock {
    /// Starts the clock at `start_secs`.
    pub fn new(start_secs: u64) -> Self {
        Self {
            secs: Arc::new(AtomicU64::new(start_secs)),
        }
    }

    /// Advances the clock by `delta` seconds.
    pub fn advance(&self, delta: u64) {
        self.secs.fetch_add(delta, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances() {
        let clock = TestClock::new(100);
        assert_eq!(clock.now_secs(), 100);
        clock.advance(50);
        assert_eq!(clock.now_secs(), 150);
    }
}
