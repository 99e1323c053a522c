//! The reserved-EID component registry.
//!
//! A fixed-capacity bitmap over `[0, R)`, one bit per reserved EID, plus
//! the registered callback and a retained name for diagnostics.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use unicast_core::{limits::RESERVED_EID_MAX, ComponentCallback, Eid};

/// Errors registering or unregistering a reserved-EID component.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Every reserved EID already has a component.
    #[error("no reserved eid available")]
    Exhausted,
}

struct Entry {
    name: String,
    callback: Arc<dyn ComponentCallback>,
}

/// A fixed-capacity allocator handing out EIDs in `[0, RESERVED_EID_MAX)`
/// to upper components (routing, DHT, management).
#[derive(Default)]
pub struct ComponentRegistry {
    entries: RwLock<HashMap<u64, Entry>>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the lowest free reserved EID for `name` and binds
    /// `callback` to it.
    pub fn register(
        &self,
        name: &str,
        callback: Arc<dyn ComponentCallback>,
    ) -> Result<Eid, RegistryError> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        for raw in 0..RESERVED_EID_MAX {
            if !entries.contains_key(&raw) {
                entries.insert(
                    raw,
                    Entry {
                        name: name.to_string(),
                        callback,
                    },
                );
                return Ok(Eid::new(raw));
            }
        }
        Err(RegistryError::Exhausted)
    }

    /// Frees a previously-registered EID. A no-op if nothing is bound.
    pub fn unregister(&self, eid: Eid) {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        entries.remove(&eid.as_u64());
    }

    /// Looks up the callback bound to `eid`, if any.
    pub fn callback(&self, eid: Eid) -> Option<Arc<dyn ComponentCallback>> {
        let entries = self.entries.read().expect("registry lock poisoned");
        entries.get(&eid.as_u64()).map(|e| Arc::clone(&e.callback))
    }

    /// The name a component registered itself under, for diagnostics.
    pub fn name_of(&self, eid: Eid) -> Option<String> {
        let entries = self.entries.read().expect("registry lock poisoned");
        entries.get(&eid.as_u64()).map(|e| e.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<Vec<u8>>>);

    impl ComponentCallback for Recorder {
        fn deliver(&self, payload: Vec<u8>) {
            self.0.lock().unwrap().push(payload);
        }
    }

    #[test]
    fn register_allocates_lowest_free_eid() {
        let reg = ComponentRegistry::new();
        let a = reg
            .register("routing", Arc::new(Recorder(Mutex::new(vec![]))))
            .unwrap();
        let b = reg
            .register("dht", Arc::new(Recorder(Mutex::new(vec![]))))
            .unwrap();
        assert_eq!(a.as_u64(), 0);
        assert_eq!(b.as_u64(), 1);
        assert_eq!(reg.name_of(a).as_deref(), Some("routing"));
    }

    #[test]
    fn unregister_frees_the_slot_for_reuse() {
        let reg = ComponentRegistry::new();
        let a = reg
            .register("routing", Arc::new(Recorder(Mutex::new(vec![]))))
            .unwrap();
        reg.unregister(a);
        let b = reg
            .register("dht", Arc::new(Recorder(Mutex::new(vec![]))))
            .unwrap();
        assert_eq!(b.as_u64(), 0);
    }

    #[test]
    fn exhausts_after_reserved_max_registrations() {
        let reg = ComponentRegistry::new();
        for _ in 0..RESERVED_EID_MAX {
            reg.register("c", Arc::new(Recorder(Mutex::new(vec![]))))
                .unwrap();
        }
        let err = reg.register("overflow", Arc::new(Recorder(Mutex::new(vec![]))));
        assert_eq!(err, Err(RegistryError::Exhausted));
    }
}
