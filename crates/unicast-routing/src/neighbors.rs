//! The `neighbors[(address, kind)] -> flow_handle` table.

use std::collections::HashMap;
use std::sync::RwLock;
use unicast_core::{Address, FlowHandle};

/// One instance per plane (`NeighborTable` for data, another for
/// management); this implementation's `neighbors[(address, kind)]` key is realized as
/// two separate tables rather than a combined map, since the two planes
/// are never iterated together.
#[derive(Default)]
struct Table {
    by_addr: HashMap<Address, FlowHandle>,
    by_handle: HashMap<FlowHandle, Address>,
}

/// Tracks the layer addresses reachable over directly-connected N-1 flows,
/// for one plane (data or management).
#[derive(Default)]
pub struct NeighborTable {
    inner: RwLock<Table>,
}

impl NeighborTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `addr` as reachable over `handle`.
    pub fn add(&self, addr: Address, handle: FlowHandle) {
        let mut t = self.inner.write().expect("neighbor table lock poisoned");
        t.by_addr.insert(addr, handle);
        t.by_handle.insert(handle, addr);
    }

    /// Removes the neighbor reachable over `handle`, returning its address
    /// if one was registered.
    pub fn remove_by_handle(&self, handle: FlowHandle) -> Option<Address> {
        let mut t = self.inner.write().expect("neighbor table lock poisoned");
        if let Some(addr) = t.by_handle.remove(&handle) {
            t.by_addr.remove(&addr);
            Some(addr)
        } else {
            None
        }
    }

    /// The flow handle currently used to reach `addr`, if connected.
    pub fn handle_for(&self, addr: Address) -> Option<FlowHandle> {
        let t = self.inner.read().expect("neighbor table lock poisoned");
        t.by_addr.get(&addr).copied()
    }

    /// The address reachable over `handle`, if any.
    pub fn addr_for(&self, handle: FlowHandle) -> Option<Address> {
        let t = self.inner.read().expect("neighbor table lock poisoned");
        t.by_handle.get(&handle).copied()
    }

    /// Every currently-connected neighbor's flow handle.
    pub fn handles(&self) -> Vec<FlowHandle> {
        let t = self.inner.read().expect("neighbor table lock poisoned");
        t.by_handle.keys().copied().collect()
    }

    /// Number of connected neighbors.
    pub fn len(&self) -> usize {
        self.inner.read().expect("neighbor table lock poisoned").by_addr.len()
    }

    /// Whether the table has no connected neighbors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
