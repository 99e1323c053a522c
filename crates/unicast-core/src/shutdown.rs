//! Cooperative shutdown for named long-running threads.
//!
//! An explicit flag plus condvar broadcast: every blocking wait takes a
//! deadline, and every periodic thread checks the flag within one cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// A shutdown signal shared between the owner of a thread and the thread
/// itself. Cloning shares the same underlying signal.
#[derive(Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    gate: Arc<(Mutex<()>, Condvar)>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    /// Creates a not-yet-signaled instance.
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            gate: Arc::new((Mutex::new(()), Condvar::new())),
        }
    }

    /// Requests shutdown and wakes every thread parked in [`Self::park`].
    pub fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let (_lock, cvar) = &*self.gate;
        cvar.notify_all();
    }

    /// Whether shutdown has been requested.
    pub fn is_signaled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleeps for at most `timeout`, waking early if shutdown is signaled.
    /// Used by periodic threads in place of a plain `thread::sleep`, so
    /// they exit within one cycle of a shutdown request.
    pub fn park(&self, timeout: Duration) {
        if self.is_signaled() {
            return;
        }
        let (lock, cvar) = &*self.gate;
        let guard = lock.lock().expect("shutdown gate poisoned");
        let _ = cvar.wait_timeout_while(guard, timeout, |_| !self.is_signaled());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn park_wakes_early_on_signal() {
        let signal = ShutdownSignal::new();
        let bg = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            bg.signal();
        });
        let start = Instant::now();
        signal.park(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
        handle.join().unwrap();
    }

    #[test]
    fn park_returns_immediately_once_already_signaled() {
        let signal = ShutdownSignal::new();
        signal.signal();
        let start = Instant::now();
        signal.park(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_millis(200));
    }
}
