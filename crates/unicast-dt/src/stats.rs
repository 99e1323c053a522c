//! Per-flow, per-QoS-cube packet/byte counters.
//!
//! One counter block per flow, each guarded by its own lock rather than a
//! single global one, so a busy flow's counters never contend with
//! another flow's.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use unicast_core::{FlowHandle, QosCube};

/// A read-only snapshot of one flow's counters for one QoS cube.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlowStatsSnapshot {
    /// Packets sent on this flow.
    pub sent_pkt: u64,
    /// Packets received on this flow.
    pub recv_pkt: u64,
    /// Packets dropped on receive (TTL expiry, bad header, no route).
    pub recv_drop_pkt: u64,
    /// Packets dropped on send (write failure).
    pub send_drop_pkt: u64,
    /// Payload bytes sent.
    pub sent_bytes: u64,
    /// Payload bytes received.
    pub recv_bytes: u64,
}

#[derive(Default)]
struct Counters {
    by_qos: Mutex<HashMap<QosCube, FlowStatsSnapshot>>,
}

impl Counters {
    fn with_cube<F: FnOnce(&mut FlowStatsSnapshot)>(&self, qos: QosCube, f: F) {
        let mut by_qos = self.by_qos.lock().expect("flow stats lock poisoned");
        f(by_qos.entry(qos).or_default());
    }
}

/// Per-flow statistics, keyed by flow handle and further split by QoS
/// cube
#[derive(Default)]
pub struct Stats {
    flows: RwLock<HashMap<FlowHandle, Counters>>,
}

impl Stats {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful send of `bytes` payload bytes.
    pub fn record_sent(&self, handle: FlowHandle, qos: QosCube, bytes: usize) {
        let mut flows = self.flows.write().expect("stats table lock poisoned");
        let counters = flows.entry(handle).or_default();
        counters.with_cube(qos, |s| {
            s.sent_pkt += 1;
            s.sent_bytes += bytes as u64;
        });
    }

    /// Records a dropped send (write failure).
    pub fn record_send_drop(&self, handle: FlowHandle, qos: QosCube) {
        let mut flows = self.flows.write().expect("stats table lock poisoned");
        let counters = flows.entry(handle).or_default();
        counters.with_cube(qos, |s| s.send_drop_pkt += 1);
    }

    /// Records a successful receive of `bytes` payload bytes.
    pub fn record_recv(&self, handle: FlowHandle, qos: QosCube, bytes: usize) {
        let mut flows = self.flows.write().expect("stats table lock poisoned");
        let counters = flows.entry(handle).or_default();
        counters.with_cube(qos, |s| {
            s.recv_pkt += 1;
            s.recv_bytes += bytes as u64;
        });
    }

    /// Records a dropped receive (TTL expiry, no route, no component).
    pub fn record_recv_drop(&self, handle: FlowHandle, qos: QosCube) {
        let mut flows = self.flows.write().expect("stats table lock poisoned");
        let counters = flows.entry(handle).or_default();
        counters.with_cube(qos, |s| s.recv_drop_pkt += 1);
    }

    /// Read-only snapshot of one flow's counters for one cube.
    pub fn snapshot(&self, handle: FlowHandle, qos: QosCube) -> FlowStatsSnapshot {
        let flows = self.flows.read().expect("stats table lock poisoned");
        flows
            .get(&handle)
            .and_then(|c| c.by_qos.lock().expect("flow stats lock poisoned").get(&qos).copied())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accumulate_per_flow_per_qos() {
        let stats = Stats::new();
        let h = FlowHandle::new(1);
        stats.record_sent(h, QosCube::new(0), 10);
        stats.record_sent(h, QosCube::new(0), 20);
        stats.record_recv_drop(h, QosCube::new(0));
        let snap = stats.snapshot(h, QosCube::new(0));
        assert_eq!(snap.sent_pkt, 2);
        assert_eq!(snap.sent_bytes, 30);
        assert_eq!(snap.recv_drop_pkt, 1);
    }

    #[test]
    fn cubes_are_independent() {
        let stats = Stats::new();
        let h = FlowHandle::new(1);
        stats.record_sent(h, QosCube::new(0), 10);
        stats.record_sent(h, QosCube::new(1), 5);
        assert_eq!(stats.snapshot(h, QosCube::new(0)).sent_bytes, 10);
        assert_eq!(stats.snapshot(h, QosCube::new(1)).sent_bytes, 5);
    }
}
