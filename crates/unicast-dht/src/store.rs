//! The DHT's local data: values this node stores for others, and the
//! reference entries for names this node has itself registered and must
//! keep republished.

use crate::id::KadId;
use std::collections::HashMap;
use std::sync::RwLock;
use unicast_core::Address;

/// One replica of a stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredValue {
    /// The address this value resolves to.
    pub addr: Address,
    /// When this value expires.
    pub expiry: u64,
    /// When this value is next due for replication to other holders.
    pub next_replication: u64,
}

#[derive(Debug, Default)]
struct Entry {
    values: Vec<StoredValue>,
}

/// A locally-registered name: tracks only when it's next due to be
/// re-published, since the value itself (always this node's own address)
/// lives in the regular entry store too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefEntry {
    /// When this reference is next due for republishing.
    pub next_republish: u64,
}

/// Published values this node stores for others, plus the names this node
/// has registered and must keep alive.
#[derive(Default)]
pub struct Store {
    entries: RwLock<HashMap<KadId, Entry>>,
    refs: RwLock<HashMap<KadId, RefEntry>>,
}

impl Store {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes one value for `key`.
    pub fn put(&self, key: KadId, addr: Address, now: u64, ttl: u64, t_replicate: u64) {
        let mut entries = self.entries.write().expect("dht entry store poisoned");
        let entry = entries.entry(key).or_default();
        let next_replication = now + t_replicate;
        match entry.values.iter_mut().find(|v| v.addr == addr) {
            Some(v) => {
                v.expiry = now + ttl;
                v.next_replication = next_replication;
            }
            None => entry.values.push(StoredValue {
                addr,
                expiry: now + ttl,
                next_replication,
            }),
        }
    }

    /// Every address currently stored for `key`, if any.
    pub fn values(&self, key: &KadId) -> Option<Vec<Address>> {
        let entries = self.entries.read().expect("dht entry store poisoned");
        entries.get(key).map(|e| e.values.iter().map(|v| v.addr).collect())
    }

    /// Drops values past their expiry, destroying entries left with none
    /// (an entry with no values does not exist), and returns the `(key,
    /// addr)` pairs whose `next_replication` has passed (bumping it
    /// forward as it does).
    pub fn expire_and_collect_replication(&self, now: u64, t_replicate: u64) -> Vec<(KadId, Address)> {
        let mut entries = self.entries.write().expect("dht entry store poisoned");
        let mut due = Vec::new();
        entries.retain(|key, entry| {
            entry.values.retain(|v| v.expiry > now);
            for v in entry.values.iter_mut() {
                if now >= v.next_replication {
                    due.push((key.clone(), v.addr));
                    v.next_replication = now + t_replicate;
                }
            }
            !entry.values.is_empty()
        });
        due
    }

    /// Adds a locally-published reference if not already present.
    pub fn add_ref(&self, key: KadId, next_republish: u64) {
        let mut refs = self.refs.write().expect("dht ref store poisoned");
        refs.entry(key).or_insert(RefEntry { next_republish });
    }

    /// Removes a reference. A no-op if absent.
    pub fn remove_ref(&self, key: &KadId) {
        self.refs.write().expect("dht ref store poisoned").remove(key);
    }

    /// Whether `key` is currently registered locally.
    pub fn has_ref(&self, key: &KadId) -> bool {
        self.refs.read().expect("dht ref store poisoned").contains_key(key)
    }

    /// Refs due for republishing, bumping `next_republish` forward as each
    /// is collected.
    pub fn due_refs(&self, now: u64, interval: u64) -> Vec<KadId> {
        let mut refs = self.refs.write().expect("dht ref store poisoned");
        let mut due = Vec::new();
        for (key, r) in refs.iter_mut() {
            if now >= r.next_republish {
                due.push(key.clone());
                r.next_republish = now + interval;
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> KadId {
        KadId::new(vec![b; 4])
    }

    #[test]
    fn put_then_values_round_trips() {
        let store = Store::new();
        store.put(key(1), Address::new(9), 100, 60, 900);
        assert_eq!(store.values(&key(1)), Some(vec![Address::new(9)]));
    }

    #[test]
    fn expired_values_are_dropped_and_empty_entries_destroyed() {
        let store = Store::new();
        store.put(key(1), Address::new(9), 100, 10, 900);
        let due = store.expire_and_collect_replication(200, 900);
        assert!(due.is_empty());
        assert_eq!(store.values(&key(1)), None);
    }

    #[test]
    fn replication_is_due_once_then_rescheduled() {
        let store = Store::new();
        store.put(key(1), Address::new(9), 0, 10_000, 100);
        let due = store.expire_and_collect_replication(150, 100);
        assert_eq!(due, vec![(key(1), Address::new(9))]);
        let due_again = store.expire_and_collect_replication(150, 100);
        assert!(due_again.is_empty());
    }

    #[test]
    fn unreg_is_idempotent() {
        let store = Store::new();
        store.remove_ref(&key(1));
        store.add_ref(key(1), 0);
        store.remove_ref(&key(1));
        store.remove_ref(&key(1));
        assert!(!store.has_ref(&key(1)));
    }

    #[test]
    fn due_refs_reschedules_forward() {
        let store = Store::new();
        store.add_ref(key(1), 0);
        assert_eq!(store.due_refs(0, 50), vec![key(1)]);
        assert!(store.due_refs(10, 50).is_empty());
        assert_eq!(store.due_refs(50, 50), vec![key(1)]);
    }
}
