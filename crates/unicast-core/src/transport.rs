//! The seam between internal components (routing, DHT, management) and
//! data transfer, so `unicast-routing` / `unicast-dht` need not depend on
//! `unicast-dt` directly. `unicast-dt::Dt` implements [`ComponentTransport`].

use crate::address::Address;
use crate::eid::Eid;
use crate::error::Result;
use crate::qos::QosCube;
use std::sync::Arc;

/// Receives packets addressed to a registered component's EID.
pub trait ComponentCallback: Send + Sync {
    /// Invoked with the packet payload (header already stripped).
    fn deliver(&self, payload: Vec<u8>);
}

/// What a registered internal component needs from data transfer: a
/// reserved EID of its own, and a way to send packets to other members.
pub trait ComponentTransport: Send + Sync {
    /// Allocates a reserved EID for `name` and wires `callback` to receive
    /// packets sent to it.
    fn register(&self, name: &str, callback: Arc<dyn ComponentCallback>) -> Result<Eid>;

    /// Frees a previously registered EID.
    fn unregister(&self, eid: Eid);

    /// Sends `payload` to `dst` at `eid`, tagged with `qos`, from `src_eid`.
    fn send(&self, dst: Address, qos: QosCube, src_eid: Eid, payload: &[u8]) -> Result<()>;
}
