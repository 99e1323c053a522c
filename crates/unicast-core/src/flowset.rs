//! A named, add/del-able collection of flows, shared by the SDU scheduler
//! (`unicast-dt`, one set per QoS cube) and the link-state reader
//! (`unicast-routing`, one set for all management flows).

use crate::flow::{Flow, FlowHandle};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A concurrently-mutable set of flows, keyed by handle.
#[derive(Default)]
pub struct FlowSet {
    flows: RwLock<HashMap<FlowHandle, Arc<dyn Flow>>>,
}

impl FlowSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self {
            flows: RwLock::new(HashMap::new()),
        }
    }

    /// Adds (or replaces) a flow.
    pub fn add(&self, flow: Arc<dyn Flow>) {
        let mut flows = self.flows.write().expect("flowset lock poisoned");
        flows.insert(flow.handle(), flow);
    }

    /// Removes a flow by handle.
    pub fn del(&self, handle: FlowHandle) {
        let mut flows = self.flows.write().expect("flowset lock poisoned");
        flows.remove(&handle);
    }

    /// Looks up a single flow by handle, for callers that address a
    /// specific neighbor rather than sweeping the whole set.
    pub fn get(&self, handle: FlowHandle) -> Option<Arc<dyn Flow>> {
        let flows = self.flows.read().expect("flowset lock poisoned");
        flows.get(&handle).cloned()
    }

    /// Returns a snapshot of the current members, for a scheduler sweep.
    pub fn snapshot(&self) -> Vec<Arc<dyn Flow>> {
        let flows = self.flows.read().expect("flowset lock poisoned");
        flows.values().cloned().collect()
    }

    /// Number of flows currently in the set.
    pub fn len(&self) -> usize {
        self.flows.read().expect("flowset lock poisoned").len()
    }

    /// Whether the set has no flows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::test_util::ChannelFlow;

    #[test]
    fn add_then_get_then_del() {
        let set = FlowSet::new();
        let (a, _b) = ChannelFlow::pair(FlowHandle::new(1), FlowHandle::new(2));
        set.add(Arc::new(a));
        assert_eq!(set.len(), 1);
        assert!(set.get(FlowHandle::new(1)).is_some());
        set.del(FlowHandle::new(1));
        assert!(set.is_empty());
        assert!(set.get(FlowHandle::new(1)).is_none());
    }

    #[test]
    fn snapshot_reflects_current_membership() {
        let set = FlowSet::new();
        let (a, _a_peer) = ChannelFlow::pair(FlowHandle::new(1), FlowHandle::new(2));
        let (b, _b_peer) = ChannelFlow::pair(FlowHandle::new(3), FlowHandle::new(4));
        set.add(Arc::new(a));
        set.add(Arc::new(b));
        assert_eq!(set.snapshot().len(), 2);
    }
}
