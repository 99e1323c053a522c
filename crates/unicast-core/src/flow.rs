//! The N-1 flow abstraction.
//!
//! Shared-memory ring buffer plumbing between the IPCP and its flow
//! allocator is out of scope for this core. [`Flow`] is the minimal seam
//! a concrete connection manager implements in their place.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Opaque identifier for one N-1 flow, stable for the flow's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowHandle(u64);

impl FlowHandle {
    /// Wraps a raw handle value.
    pub fn new(raw: u64) -> Self {
        FlowHandle(raw)
    }

    /// Returns the raw handle value.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FlowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow#{}", self.0)
    }
}

/// Errors a [`Flow`] implementation may surface.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    /// The flow is no longer usable (peer gone, connection reset, ...).
    #[error("flow is down")]
    Down,
}

/// A point-to-point channel to another layer member, used as transport by
/// every subsystem (DT forwarding, link-state flooding, DHT RPCs).
///
/// Reads are blocking with a deadline: a read is a suspension point
/// bounded by the SDU scheduler's sweep interval; writes are non-blocking
/// from the caller's perspective and fail fast on a dead peer.
pub trait Flow: Send + Sync {
    /// Writes one already-framed buffer to the flow.
    fn write(&self, buf: &[u8]) -> Result<(), FlowError>;

    /// Reads one buffer, waiting at most `timeout`. Returns `Ok(None)` on a
    /// timeout with no data ready, never blocking past `timeout`.
    fn read_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>, FlowError>;

    /// This flow's stable handle.
    fn handle(&self) -> FlowHandle;
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_util {
    //! An in-memory `Flow` test double backed by a channel pair, for tests
    //! that need a real send/receive round trip without a live socket.

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{Receiver, Sender, TryRecvError};
    use std::sync::Mutex;

    /// One direction of an in-memory flow pair.
    pub struct ChannelFlow {
        handle: FlowHandle,
        tx: Sender<Vec<u8>>,
        rx: Mutex<Receiver<Vec<u8>>>,
        down: AtomicBool,
    }

    impl ChannelFlow {
        /// Builds a connected pair of flows sharing one handle namespace.
        pub fn pair(handle_a: FlowHandle, handle_b: FlowHandle) -> (ChannelFlow, ChannelFlow) {
            let (tx_a, rx_b) = std::sync::mpsc::channel();
            let (tx_b, rx_a) = std::sync::mpsc::channel();
            (
                ChannelFlow {
                    handle: handle_a,
                    tx: tx_a,
                    rx: Mutex::new(rx_a),
                    down: AtomicBool::new(false),
                },
                ChannelFlow {
                    handle: handle_b,
                    tx: tx_b,
                    rx: Mutex::new(rx_b),
                    down: AtomicBool::new(false),
                },
            )
        }

        /// Marks this end (and all subsequent writes/reads) as dead.
        pub fn kill(&self) {
            self.down.store(true, Ordering::SeqCst);
        }
    }

    impl Flow for ChannelFlow {
        fn write(&self, buf: &[u8]) -> Result<(), FlowError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(FlowError::Down);
            }
            self.tx.send(buf.to_vec()).map_err(|_| FlowError::Down)
        }

        fn read_timeout(&self, timeout: Duration) -> Result<Option<Vec<u8>>, FlowError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(FlowError::Down);
            }
            let rx = self.rx.lock().expect("channel flow mutex poisoned");
            match rx.recv_timeout(timeout) {
                Ok(buf) => Ok(Some(buf)),
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => Ok(None),
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => Err(FlowError::Down),
            }
        }

        fn handle(&self) -> FlowHandle {
            self.handle
        }
    }

    /// Non-blocking variant used by tests that poll rather than block.
    pub fn try_read(flow: &ChannelFlow) -> Result<Option<Vec<u8>>, FlowError> {
        if flow.down.load(Ordering::SeqCst) {
            return Err(FlowError::Down);
        }
        let rx = flow.rx.lock().expect("channel flow mutex poisoned");
        match rx.try_recv() {
            Ok(buf) => Ok(Some(buf)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(FlowError::Down),
        }
    }
}
