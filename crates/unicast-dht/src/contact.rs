//! A Kademlia contact: `(id, address, fails, last_seen)`.

use crate::id::KadId;
use serde::{Deserialize, Serialize};
use unicast_core::Address;

/// One known peer in the DHT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    /// The peer's node id.
    pub id: KadId,
    /// The peer's layer address.
    pub addr: Address,
    /// Consecutive failed requests, reset on any successful response.
    pub fails: u32,
    /// Timestamp of the last time this contact was seen or refreshed.
    pub t_seen: u64,
}

impl Contact {
    /// Builds a freshly-seen contact.
    pub fn new(id: KadId, addr: Address, now: u64) -> Self {
        Self {
            id,
            addr,
            fails: 0,
            t_seen: now,
        }
    }
}
