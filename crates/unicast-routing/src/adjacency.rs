//! The `adjacencies{(src, dst) -> last_seen}` table.

use std::collections::HashMap;
use std::sync::RwLock;
use unicast_core::Address;

#[derive(Default)]
pub struct AdjacencyTable {
    inner: RwLock<HashMap<(Address, Address), u64>>,
}

impl AdjacencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the adjacency if absent, or refreshes its timestamp. Returns
    /// `true` if this call created the entry (it didn't exist before), so
    /// callers can tell a fresh adjacency from a re-touched one.
    pub fn touch(&self, src: Address, dst: Address, now: u64) -> bool {
        let mut t = self.inner.write().expect("adjacency table lock poisoned");
        t.insert((src, dst), now).is_none()
    }

    /// Every adjacency rooted at `src`, i.e. `src == self`'s local links.
    pub fn local(&self, src: Address) -> Vec<Address> {
        let t = self.inner.read().expect("adjacency table lock poisoned");
        t.keys()
            .filter(|(s, _)| *s == src)
            .map(|(_, d)| *d)
            .collect()
    }

    /// Removes an adjacency outright (explicit withdrawal).
    pub fn remove(&self, src: Address, dst: Address) {
        let mut t = self.inner.write().expect("adjacency table lock poisoned");
        t.remove(&(src, dst));
    }

    /// Removes and returns every adjacency last refreshed before
    /// `now - timeo_secs`.
    pub fn drain_stale(&self, now: u64, timeo_secs: u64) -> Vec<(Address, Address)> {
        let mut t = self.inner.write().expect("adjacency table lock poisoned");
        let stale: Vec<(Address, Address)> = t
            .iter()
            .filter(|(_, &last_seen)| now.saturating_sub(last_seen) > timeo_secs)
            .map(|(&k, _)| k)
            .collect();
        for key in &stale {
            t.remove(key);
        }
        stale
    }

    /// Number of adjacencies currently tracked.
    pub fn len(&self) -> usize {
        self.inner.read().expect("adjacency table lock poisoned").len()
    }

    /// Whether no adjacencies are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_then_local_lists_own_adjacencies() {
        let t = AdjacencyTable::new();
        t.touch(Address::new(1), Address::new(2), 100);
        t.touch(Address::new(3), Address::new(1), 100);
        assert_eq!(t.local(Address::new(1)), vec![Address::new(2)]);
    }

    #[test]
    fn drain_stale_removes_only_expired_entries() {
        let t = AdjacencyTable::new();
        t.touch(Address::new(1), Address::new(2), 0);
        t.touch(Address::new(1), Address::new(3), 50);
        let stale = t.drain_stale(100, 60);
        assert_eq!(stale, vec![(Address::new(1), Address::new(2))]);
        assert_eq!(t.len(), 1);
    }
}
