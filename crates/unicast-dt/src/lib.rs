#![warn(missing_docs)]

//! Data transfer (DT): per-packet header (de)serialization, TTL
//! enforcement, next-hop lookup, local demultiplexing, and the per-flow
//! statistics the rest of the layer reads.

pub mod header;
pub mod registry;
pub mod scheduler;
pub mod stats;

use header::{DtPci, HeaderError};
use registry::ComponentRegistry;
use stats::Stats;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use unicast_core::{
    Address, ComponentCallback, ComponentTransport, CoreError, Eid, Flow, FlowHandle, FlowSet,
    Notifier, QosCube, Result as CoreResult,
};
use unicast_pff::Pff;

/// Errors specific to DT's own receive/send paths, convertible into
/// [`CoreError`] at the glue layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DtError {
    /// The wire header was malformed.
    #[error(transparent)]
    Header(#[from] HeaderError),
    /// No PFF is configured for the packet's QoS cube.
    #[error("no forwarding table for qos cube")]
    UnknownQos,
    /// No next hop for the destination in that cube's PFF.
    #[error("no route for destination")]
    NoRoute,
    /// The packet's ttl reached zero at the forwarding point.
    #[error("ttl expired")]
    TtlExpired,
    /// The chosen next-hop flow (or the destination flow endpoint) is down.
    #[error("flow down")]
    FlowDown,
    /// The local eid has no registered component and is not a flow
    /// endpoint currently attached to this Dt.
    #[error("no component for eid")]
    NoComponent,
}

impl From<DtError> for CoreError {
    fn from(e: DtError) -> Self {
        match e {
            DtError::Header(h) => CoreError::Protocol {
                reason: h.to_string(),
            },
            DtError::UnknownQos => CoreError::Protocol {
                reason: "unknown qos cube".into(),
            },
            DtError::NoRoute => CoreError::NoRoute,
            DtError::TtlExpired => CoreError::TtlExpired,
            DtError::FlowDown => CoreError::FlowDown,
            DtError::NoComponent => CoreError::NoComponent,
        }
    }
}

/// Data transfer: the per-packet forwarding/demux engine shared by every
/// upper component via [`ComponentTransport`].
pub struct Dt {
    self_addr: Address,
    addr_size: u8,
    eid_size: u8,
    max_ttl: u8,
    pffs: HashMap<QosCube, Arc<Pff>>,
    /// Every currently-attached N-1 data flow, keyed by handle: used both
    /// to resolve a PFF next-hop handle to an actual flow, and to strip
    /// and deliver packets addressed to a flow-endpoint eid.
    data_flows: Arc<FlowSet>,
    registry: ComponentRegistry,
    stats: Stats,
    notifier: Arc<Notifier>,
}

impl Dt {
    /// Builds a DT instance sharing `pffs` (one per QoS cube) with the
    /// routing policy, and `data_flows` with the SDU scheduler.
    pub fn new(
        self_addr: Address,
        addr_size: u8,
        eid_size: u8,
        max_ttl: u8,
        pffs: HashMap<QosCube, Arc<Pff>>,
        data_flows: Arc<FlowSet>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            self_addr,
            addr_size,
            eid_size,
            max_ttl,
            pffs,
            data_flows,
            registry: ComponentRegistry::new(),
            stats: Stats::new(),
            notifier,
        }
    }

    /// Read-only access to per-flow statistics.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Handles one packet read off an N-1 flow by the SDU scheduler:
    /// decodes the header, forwards or demultiplexes
    /// receive path.
    pub fn on_packet(&self, ingress: FlowHandle, qos: QosCube, buf: &[u8]) -> Result<(), DtError> {
        let (mut pci, payload) = DtPci::decode(buf, self.addr_size, self.eid_size)?;

        if pci.dst_addr != self.self_addr {
            if pci.ttl == 0 {
                self.stats.record_recv_drop(ingress, qos);
                return Err(DtError::TtlExpired);
            }
            pci.ttl -= 1;
            let Some(pff) = self.pffs.get(&pci.qos_cube) else {
                self.stats.record_recv_drop(ingress, qos);
                return Err(DtError::UnknownQos);
            };
            let next_hop = pff.next_hop(pci.dst_addr).map_err(|_| {
                self.stats.record_recv_drop(ingress, qos);
                DtError::NoRoute
            })?;
            let Some(flow) = self.data_flows.get(next_hop) else {
                self.stats.record_recv_drop(ingress, qos);
                return Err(DtError::FlowDown);
            };
            let wire = rebuild_wire(&pci, payload, self.addr_size, self.eid_size);
            match flow.write(&wire) {
                Ok(()) => {
                    self.stats.record_sent(next_hop, qos, payload.len());
                    Ok(())
                }
                Err(_) => {
                    warn!(%next_hop, "forwarding write failed, flow is down");
                    self.notifier
                        .publish(unicast_core::Event::DataConnDown { flow: next_hop });
                    self.stats.record_send_drop(next_hop, qos);
                    Err(DtError::FlowDown)
                }
            }
        } else {
            self.stats.record_recv(ingress, qos, payload.len());
            if pci.eid.is_reserved() {
                match self.registry.callback(pci.eid) {
                    Some(cb) => {
                        cb.deliver(payload.to_vec());
                        Ok(())
                    }
                    None => {
                        self.stats.record_recv_drop(ingress, qos);
                        Err(DtError::NoComponent)
                    }
                }
            } else {
                let handle = FlowHandle::new(pci.eid.as_u64());
                match self.data_flows.get(handle) {
                    Some(flow) => flow.write(payload).map_err(|_| DtError::FlowDown),
                    None => {
                        self.stats.record_recv_drop(ingress, qos);
                        Err(DtError::NoComponent)
                    }
                }
            }
        }
    }

    /// Sends a locally-originated packet.
    pub fn send(&self, dst: Address, qos: QosCube, src_eid: Eid, payload: &[u8]) -> Result<(), DtError> {
        let pff = self.pffs.get(&qos).ok_or(DtError::UnknownQos)?;
        let next_hop = pff.next_hop(dst).map_err(|_| DtError::NoRoute)?;
        let flow = self.data_flows.get(next_hop).ok_or(DtError::FlowDown)?;
        let pci = DtPci {
            dst_addr: dst,
            qos_cube: qos,
            eid: src_eid,
            ttl: self.max_ttl,
        };
        let wire = rebuild_wire(&pci, payload, self.addr_size, self.eid_size);
        flow.write(&wire).map_err(|_| {
            self.notifier
                .publish(unicast_core::Event::DataConnDown { flow: next_hop });
            self.stats.record_send_drop(next_hop, qos);
            DtError::FlowDown
        })?;
        self.stats.record_sent(next_hop, qos, payload.len());
        Ok(())
    }
}

fn rebuild_wire(pci: &DtPci, payload: &[u8], addr_size: u8, eid_size: u8) -> Vec<u8> {
    let mut wire = pci.encode(addr_size, eid_size);
    wire.extend_from_slice(payload);
    wire
}

impl ComponentTransport for Dt {
    fn register(&self, name: &str, callback: Arc<dyn ComponentCallback>) -> CoreResult<Eid> {
        let eid = self
            .registry
            .register(name, callback)
            .map_err(|_| CoreError::Resource {
                reason: "no reserved eid available".into(),
            })?;
        debug!(%name, eid = eid.as_u64(), "component registered");
        Ok(eid)
    }

    fn unregister(&self, eid: Eid) {
        self.registry.unregister(eid);
    }

    fn send(&self, dst: Address, qos: QosCube, src_eid: Eid, payload: &[u8]) -> CoreResult<()> {
        Dt::send(self, dst, qos, src_eid, payload).map_err(Into::into)
    }
}
