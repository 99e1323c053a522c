#![warn(missing_docs)]

//! Wires the unicast IPCP subsystems -- data transfer, routing, the SDU
//! scheduler, and the DHT -- into one runnable layer member.
//!
//! This crate owns none of the protocol logic itself; it's the harness
//! that constructs each component with shared state (the PFFs, the N-1
//! flow sets, the notifier bus) and drives their lifecycle, the way
//! `unicast-node`'s binary entry point needs to. Enrollment and the
//! resource-manager RPC that would normally populate `data_flows` and
//! `mgmt_flows` with real N-1 connections are out of scope here: this
//! harness starts a member ready to accept flows through
//! [`System::data_flows`] / [`System::mgmt_flows`], not a network listener.

pub mod config;

use config::NodeConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use unicast_core::{
    Address, Clock, ComponentTransport, FlowHandle, FlowSet, Notifier, QosCube, SubscriberId,
};
use unicast_dht::{Dht, KadConfig};
use unicast_dt::scheduler::SduScheduler;
use unicast_dt::Dt;
use unicast_pff::Pff;
use unicast_routing::Routing;

type PacketHandler = Box<dyn Fn(QosCube, Vec<u8>, FlowHandle) + Send + Sync>;

/// One running layer member: DT, routing, the SDU scheduler, and the DHT,
/// all sharing the same address, PFFs, and flow sets.
pub struct System {
    /// Data transfer / forwarding engine, also the [`ComponentTransport`]
    /// every upper component attaches to.
    pub dt: Arc<Dt>,
    /// Link-state routing policy owning the graph and the PFFs `dt` reads.
    pub routing: Arc<Routing>,
    /// The distributed name directory.
    pub dht: Arc<Dht>,
    /// The SDU scheduler polling every attached data flow.
    pub scheduler: Arc<SduScheduler<PacketHandler>>,
    /// The process-wide event bus `routing` consumes and a connection
    /// manager would publish to.
    pub notifier: Arc<Notifier>,
    /// Data-plane N-1 flows; a connection manager adds/removes entries
    /// here as flows are admitted or torn down.
    pub data_flows: Arc<FlowSet>,
    /// Management-plane N-1 flows carrying link-state traffic.
    pub mgmt_flows: Arc<FlowSet>,
    /// Peer to join the DHT through, if this member isn't the first.
    pub join_peer: Option<Address>,
    scheduler_thread: std::sync::Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl System {
    /// Constructs every subsystem from `config`, wiring the shared PFFs,
    /// flow sets, and notifier bus between them, but starts nothing yet.
    pub fn build(config: &NodeConfig, clock: Arc<dyn Clock>) -> Arc<Self> {
        let notifier = Arc::new(Notifier::new());
        let self_addr = Address::new(config.self_addr);
        let qos_cubes: Vec<QosCube> = config.qos_cubes.iter().copied().map(QosCube::new).collect();
        let mgmt_flows = Arc::new(FlowSet::new());
        let data_flows = Arc::new(FlowSet::new());

        let algo = unicast_routing::algo_for(config.bootstrap.routing_policy);
        let routing = Routing::new(
            self_addr,
            config.bootstrap.addr_size,
            algo,
            config.bootstrap.pff_policy,
            &qos_cubes,
            Arc::clone(&clock),
            config.routing_timers.to_timers(),
            Arc::clone(&mgmt_flows),
        );

        let notifier_routing = Arc::clone(&routing);
        notifier.subscribe(SubscriberId(0), move |event| {
            notifier_routing.handle_event(event);
        });

        let pffs: HashMap<QosCube, Arc<Pff>> = qos_cubes
            .iter()
            .filter_map(|&q| routing.pff(q).map(|pff| (q, pff)))
            .collect();

        let dt = Arc::new(Dt::new(
            self_addr,
            config.bootstrap.addr_size,
            config.bootstrap.eid_size,
            config.bootstrap.max_ttl,
            pffs,
            Arc::clone(&data_flows),
            Arc::clone(&notifier),
        ));

        let scheduler_cubes: HashMap<QosCube, Arc<FlowSet>> = qos_cubes
            .iter()
            .map(|&q| (q, Arc::clone(&data_flows)))
            .collect();
        let dispatch_dt = Arc::clone(&dt);
        let handler: PacketHandler = Box::new(move |cube, buf, ingress| {
            if let Err(e) = dispatch_dt.on_packet(ingress, cube, &buf) {
                warn!(?ingress, error = %e, "dropping undeliverable packet");
            }
        });
        let scheduler = Arc::new(SduScheduler::new(scheduler_cubes, handler));

        let kad_cfg = match &config.dht {
            Some(o) => KadConfig::bootstrap_defaults(config.bootstrap.dht_hash_len).adopt(
                o.alpha,
                config.bootstrap.dht_hash_len,
                o.k,
                o.t_expire,
                o.t_replicate,
            ),
            None => KadConfig::bootstrap_defaults(config.bootstrap.dht_hash_len),
        };
        let dht_qos = qos_cubes.first().copied().unwrap_or(QosCube::new(0));
        let dht = Dht::new(self_addr, dht_qos, Arc::clone(&clock), kad_cfg);
        dht.attach(Arc::clone(&dt) as Arc<dyn ComponentTransport>)
            .expect("dht registration must succeed on a freshly built dt");

        Arc::new(Self {
            dt,
            routing,
            dht,
            scheduler,
            notifier,
            data_flows,
            mgmt_flows,
            join_peer: config.join_peer.map(Address::new),
            scheduler_thread: std::sync::Mutex::new(None),
        })
    }

    /// Starts routing's background threads, the SDU scheduler, and the
    /// DHT, joining through [`System::join_peer`] if set or bootstrapping
    /// a fresh ring otherwise.
    pub fn start(self: &Arc<Self>) {
        self.routing.start();

        let mut slot = self.scheduler_thread.lock().expect("scheduler thread lock poisoned");
        *slot = Some(Arc::clone(&self.scheduler).start());
        drop(slot);

        match self.join_peer {
            Some(peer) => {
                if let Err(e) = self.dht.join(peer) {
                    warn!(error = %e, "dht join failed, falling back to bootstrap");
                    self.dht.bootstrap();
                }
            }
            None => self.dht.bootstrap(),
        }
    }

    /// Signals every background thread to stop and joins them, in the
    /// reverse of start order.
    pub fn stop(&self) {
        self.dht.stop();
        self.scheduler.shutdown();
        if let Some(handle) = self.scheduler_thread.lock().expect("scheduler thread lock poisoned").take() {
            let _ = handle.join();
        }
        self.routing.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::NodeConfig;
    use unicast_core::SystemClock;

    #[test]
    fn builds_and_starts_a_solo_member_without_a_join_peer() {
        let config = NodeConfig {
            self_addr: 1,
            ..NodeConfig::default()
        };
        let system = System::build(&config, Arc::new(SystemClock));
        system.start();
        assert!(system.dht.id().is_some());
        system.stop();
    }

    #[test]
    fn scheduler_serves_every_configured_qos_cube() {
        let config = NodeConfig {
            self_addr: 1,
            qos_cubes: vec![0, 1],
            ..NodeConfig::default()
        };
        let system = System::build(&config, Arc::new(SystemClock));
        assert!(system.scheduler.cube(QosCube::new(0)).is_some());
        assert!(system.scheduler.cube(QosCube::new(1)).is_some());
        assert!(system.routing.pff(QosCube::new(0)).is_some());
        assert!(system.routing.pff(QosCube::new(1)).is_some());
    }
}
