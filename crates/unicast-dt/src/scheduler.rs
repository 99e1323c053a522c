//! The SDU scheduler: one owned thread doing a round-robin
//! sweep over QoS cubes, each cube a [`FlowSet`] of attached N-1 flows.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::trace;
use unicast_core::{FlowSet, QosCube, ShutdownSignal};

/// Per-cube wait timeout for the scheduler's non-blocking read sweep: a
/// short timeout (≈10 µs wall-clock) so no single cube's empty flows can
/// stall the round-robin for long.
const SWEEP_TIMEOUT: Duration = Duration::from_micros(10);

/// Drives a pool of N-1 flows, one [`FlowSet`] per QoS cube, handing every
/// ready packet to a caller-supplied handler.
pub struct SduScheduler<F> {
    cubes: HashMap<QosCube, Arc<FlowSet>>,
    handler: Arc<F>,
    shutdown: ShutdownSignal,
}

impl<F> SduScheduler<F>
where
    F: Fn(QosCube, Vec<u8>, unicast_core::FlowHandle) + Send + Sync + 'static,
{
    /// Builds a scheduler over `cubes`, calling `handler(cube, buffer,
    /// ingress_handle)` for every packet read.
    pub fn new(cubes: HashMap<QosCube, Arc<FlowSet>>, handler: F) -> Self {
        Self {
            cubes,
            handler: Arc::new(handler),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// The flow set backing `cube`, for `add`/`del` by the connection
    /// manager glue.
    pub fn cube(&self, cube: QosCube) -> Option<Arc<FlowSet>> {
        self.cubes.get(&cube).cloned()
    }

    /// Starts the scheduler's one owned thread.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        thread::Builder::new()
            .name("sdu-scheduler".into())
            .spawn(move || self.sweep_loop())
            .expect("failed to spawn sdu-scheduler thread")
    }

    fn sweep_loop(&self) {
        loop {
            if self.shutdown.is_signaled() {
                return;
            }
            let mut any = false;
            for (&cube, set) in &self.cubes {
                for flow in set.snapshot() {
                    if self.shutdown.is_signaled() {
                        return;
                    }
                    match flow.read_timeout(SWEEP_TIMEOUT) {
                        Ok(Some(buf)) => {
                            any = true;
                            (self.handler)(cube, buf, flow.handle());
                        }
                        Ok(None) => {}
                        Err(_) => {
                            set.del(flow.handle());
                        }
                    }
                }
            }
            if !any {
                trace!("sdu scheduler idle sweep");
            }
        }
    }

    /// Requests shutdown; the scheduler thread exits within one outer
    /// sweep cancellation contract.
    pub fn shutdown(&self) {
        self.shutdown.signal();
    }
}
