//! End-to-end DHT scenarios: register-then-query across joined nodes, and
//! replication surviving the loss of the original publisher.
//!
//! Each node gets its own [`Dht`] wired to a tiny in-memory hub that
//! routes `ComponentTransport::send` straight to the addressed peer's
//! `deliver`, synchronously. Because delivery is synchronous, a lookup's
//! `PendingRequest` is already resolved by the time its waiter parks, so
//! these scenarios need no real sleeps beyond the one small wait in the
//! replication test, which exercises the periodic worker's real-time
//! schedule rather than the request/response path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use unicast_core::{Address, Clock, ComponentCallback, ComponentTransport, CoreError, Eid, QosCube, Result as CoreResult, SystemClock};
use unicast_dht::config::KadConfig;
use unicast_dht::id::KadId;
use unicast_dht::Dht;

struct Hub {
    peers: Mutex<HashMap<Address, Arc<dyn ComponentCallback>>>,
}

impl Hub {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            peers: Mutex::new(HashMap::new()),
        })
    }
}

struct HubTransport {
    hub: Arc<Hub>,
    self_addr: Address,
}

impl ComponentTransport for HubTransport {
    fn register(&self, _name: &str, callback: Arc<dyn ComponentCallback>) -> CoreResult<Eid> {
        self.hub.peers.lock().unwrap().insert(self.self_addr, callback);
        Ok(Eid::new(2))
    }

    fn unregister(&self, _eid: Eid) {
        self.hub.peers.lock().unwrap().remove(&self.self_addr);
    }

    fn send(&self, dst: Address, _qos: QosCube, _src_eid: Eid, payload: &[u8]) -> CoreResult<()> {
        let cb = {
            let peers = self.hub.peers.lock().unwrap();
            peers.get(&dst).cloned()
        };
        match cb {
            Some(cb) => {
                cb.deliver(payload.to_vec());
                Ok(())
            }
            None => Err(CoreError::FlowDown),
        }
    }
}

fn node(hub: &Arc<Hub>, addr: u64, cfg: KadConfig) -> Arc<Dht> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dht = Dht::new(Address::new(addr), QosCube::new(0), clock, cfg);
    let transport = Arc::new(HubTransport {
        hub: Arc::clone(hub),
        self_addr: Address::new(addr),
    });
    dht.attach(transport).expect("attach must succeed");
    dht
}

#[test]
fn reg_then_query_from_other_nodes_resolves_across_the_mesh() {
    let hub = Hub::new();
    let cfg = KadConfig::bootstrap_defaults(8);

    let a = node(&hub, 1, cfg);
    a.bootstrap();

    let b = node(&hub, 2, cfg);
    b.join(Address::new(1)).expect("b joins through a");

    let c = node(&hub, 3, cfg);
    c.join(Address::new(1)).expect("c joins through a");

    let key = KadId::new(vec![0xAB; 8]);
    b.reg(key.clone()).expect("b registers its own name");

    assert_eq!(c.query(&key).unwrap(), Address::new(2));
    assert_eq!(a.query(&key).unwrap(), Address::new(2));

    a.stop();
    b.stop();
    c.stop();
}

#[test]
fn unreg_removes_the_local_registration_but_leaves_replicas_queryable() {
    let hub = Hub::new();
    let cfg = KadConfig::bootstrap_defaults(8);

    let a = node(&hub, 1, cfg);
    a.bootstrap();
    let b = node(&hub, 2, cfg);
    b.join(Address::new(1)).expect("b joins through a");

    let key = KadId::new(vec![0x11; 8]);
    b.reg(key.clone()).expect("b registers its own name");
    assert_eq!(a.query(&key).unwrap(), Address::new(2));

    b.unreg(&key);
    assert!(!b.is_registered(&key));
    // a's replica is untouched by b's local unreg -- it expires on its own
    // schedule rather than being recalled.
    assert_eq!(a.query(&key).unwrap(), Address::new(2));

    a.stop();
    b.stop();
}

#[test]
fn replicated_value_survives_after_the_publisher_stops() {
    let hub = Hub::new();
    let mut cfg = KadConfig::bootstrap_defaults(8);
    cfg.t_expire = 3600;

    let a = node(&hub, 1, cfg);
    a.bootstrap();
    let b = node(&hub, 2, cfg);
    b.join(Address::new(1)).expect("b joins through a");

    let key = KadId::new(vec![0x22; 8]);
    b.reg(key.clone()).expect("b registers its own name");
    assert_eq!(a.query(&key).unwrap(), Address::new(2));

    // b goes away; its replica on a is unaffected.
    b.stop();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(a.query(&key).unwrap(), Address::new(2));

    a.stop();
}
