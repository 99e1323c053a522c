#![warn(missing_docs)]

//! Unicast IPCP subsystem: a Kademlia-based distributed directory mapping
//! registered names to layer addresses.
//!
//! [`Dht`] owns the bucket routing table, the local value/reference
//! stores, the outstanding request table, and a periodic worker thread
//! that republishes, expires, replicates, and refreshes on a schedule
//! derived once from the protocol's own timing parameters. It speaks to
//! the rest of the layer only through [`unicast_core::ComponentTransport`]
//! / [`unicast_core::ComponentCallback`], over a reserved EID, so this
//! crate has no dependency on `unicast-dt` itself.

pub mod bucket;
pub mod config;
pub mod contact;
pub mod id;
pub mod lookup;
pub mod message;
pub mod request;
pub mod store;

use bucket::BucketTree;
pub use config::KadConfig;
use contact::Contact;
use id::KadId;
use message::{KadMessage, KadParams, Payload, ResponsePayload};
use request::{PendingRequest, RequestOutcome};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use store::Store;
use thiserror::Error;
use tracing::{debug, info, warn};
use unicast_core::{
    Address, Clock, ComponentCallback, ComponentTransport, CoreError, Eid, QosCube,
    Result as CoreResult, ShutdownSignal,
};

/// Errors raised by the DHT's own operations, converted into
/// [`CoreError`] at the glue layer.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtError {
    /// The DHT has been shut down.
    #[error("dht is shut down")]
    Shutdown,
    /// The operation did not complete before its deadline.
    #[error("dht operation timed out")]
    Timeout,
    /// `join` was called on a DHT that isn't in `Init`.
    #[error("dht is not in the init state")]
    InvalidState,
}

impl From<DhtError> for CoreError {
    fn from(e: DhtError) -> Self {
        match e {
            DhtError::Shutdown => CoreError::Shutdown,
            DhtError::Timeout => CoreError::Timeout,
            DhtError::InvalidState => CoreError::Resource {
                reason: "dht not in init state".into(),
            },
        }
    }
}

/// The top-level DHT lifecycle state.
///
/// `Init -> Joining -> Running -> Shutdown` is the only path forward;
/// a join that exhausts its retries returns to `Init` rather than
/// advancing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhtState {
    /// Constructed but not yet bootstrapped or joined.
    Init,
    /// A `join` is in flight.
    Joining,
    /// Bootstrapped or joined; serving requests and running the worker.
    Running,
    /// Torn down; no further operations are serviced.
    Shutdown,
}

/// A 32-bit cookie allocator scoped to one DHT instance.
#[derive(Default)]
struct CookiePool {
    next: u32,
    used: HashSet<u32>,
}

impl CookiePool {
    fn alloc(&mut self) -> u32 {
        loop {
            self.next = self.next.wrapping_add(1);
            if self.next != 0 && self.used.insert(self.next) {
                return self.next;
            }
        }
    }

    fn free(&mut self, cookie: u32) {
        self.used.remove(&cookie);
    }
}

/// One Kademlia DHT instance: bucket table, value/reference stores,
/// outstanding requests, and the periodic worker.
pub struct Dht {
    self_addr: Address,
    self_id: RwLock<Option<KadId>>,
    config: Mutex<KadConfig>,
    buckets: RwLock<BucketTree>,
    store: Store,
    requests: Mutex<HashMap<u32, Arc<PendingRequest>>>,
    cookies: Mutex<CookiePool>,
    state: Mutex<DhtState>,
    state_cv: Condvar,
    transport: RwLock<Option<Arc<dyn ComponentTransport>>>,
    eid: RwLock<Option<Eid>>,
    qos: QosCube,
    clock: Arc<dyn Clock>,
    shutdown: ShutdownSignal,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Dht {
    /// Builds a DHT instance at `self_addr`, not yet attached to
    /// transport nor bootstrapped/joined.
    pub fn new(self_addr: Address, qos: QosCube, clock: Arc<dyn Clock>, config: KadConfig) -> Arc<Self> {
        let now = clock.now_secs();
        Arc::new(Self {
            self_addr,
            self_id: RwLock::new(None),
            buckets: RwLock::new(BucketTree::new(config.k, config.beta, config.b as usize, now)),
            store: Store::new(),
            requests: Mutex::new(HashMap::new()),
            cookies: Mutex::new(CookiePool::default()),
            state: Mutex::new(DhtState::Init),
            state_cv: Condvar::new(),
            transport: RwLock::new(None),
            eid: RwLock::new(None),
            qos,
            config: Mutex::new(config),
            clock,
            shutdown: ShutdownSignal::new(),
            worker: Mutex::new(None),
        })
    }

    /// Registers this DHT as a component with `transport`, under a
    /// reserved EID, so it can send and receive Kademlia messages.
    pub fn attach(self: &Arc<Self>, transport: Arc<dyn ComponentTransport>) -> CoreResult<()> {
        let eid = transport.register("dht", Arc::clone(self) as Arc<dyn ComponentCallback>)?;
        *self.eid.write().expect("dht eid lock poisoned") = Some(eid);
        *self.transport.write().expect("dht transport lock poisoned") = Some(transport);
        Ok(())
    }

    /// Becomes the first member of a fresh layer: draws a random id,
    /// starts the periodic worker, and transitions straight to `Running`.
    pub fn bootstrap(self: &Arc<Self>) {
        let b = self.config().b as usize;
        *self.self_id.write().expect("dht id lock poisoned") = Some(KadId::random(b));
        self.set_state(DhtState::Running);
        self.start_worker();
        info!("dht bootstrapped");
    }

    /// Joins an existing layer through `peer_addr`: sends JOIN, waits
    /// `t_join` for a reply, retrying up to `r_join` times with
    /// `join_intv` between attempts. On success, adopts the responder's
    /// parameters, starts the worker, and kicks off a best-effort
    /// self-lookup to populate the bucket table. Falls back to `Init` if
    /// every attempt is exhausted.
    pub fn join(self: &Arc<Self>, peer_addr: Address) -> Result<(), DhtError> {
        self.set_state_init_to_joining()?;
        let temp_id = KadId::random(self.config().b as usize);
        *self.self_id.write().expect("dht id lock poisoned") = Some(temp_id.clone());

        for attempt in 0..self.config().r_join {
            if self.shutdown.is_signaled() {
                self.set_state(DhtState::Init);
                return Err(DhtError::Shutdown);
            }

            let cfg = self.config();
            let payload = Payload::Join(KadParams {
                alpha: cfg.alpha,
                b: cfg.b,
                k: cfg.k as u32,
                t_expire: cfg.t_expire,
                t_replicate: cfg.t_replicate,
            });
            let outcome = self.send_kad_request(temp_id.clone(), peer_addr, payload, cfg.t_join);

            if let RequestOutcome::Responded(msg) = outcome {
                if let Payload::Response(ResponsePayload::Join(params)) = msg.payload {
                    self.adopt_params(params);
                    self.set_state(DhtState::Running);
                    self.start_worker();
                    let dht = Arc::clone(self);
                    thread::spawn(move || {
                        let own_id = dht.local_id();
                        dht.run_lookup(&own_id, false);
                    });
                    return Ok(());
                }
            }
            debug!(attempt, "dht join attempt failed, retrying");
            self.shutdown.park(self.config().join_intv);
        }

        *self.self_id.write().expect("dht id lock poisoned") = None;
        self.set_state(DhtState::Init);
        Err(DhtError::Timeout)
    }

    /// Registers `key` as resolving to this node's own address, idempotent
    /// and immediately publishing into the network.
    pub fn reg(&self, key: KadId) -> Result<(), DhtError> {
        self.wait_running()?;
        let now = self.clock.now_secs();
        self.store.add_ref(key.clone(), now);
        self.publish(key, self.self_addr, self.config().t_expire);
        Ok(())
    }

    /// Removes a local registration. A no-op if `key` wasn't registered.
    pub fn unreg(&self, key: &KadId) {
        self.store.remove_ref(key);
    }

    /// Resolves `key` to an address: a local entry first (preferring an
    /// address other than self), else a FIND_VALUE lookup (preferring an
    /// address other than self; `Address::INVALID` if only self was
    /// found), else `Address::INVALID`.
    pub fn query(&self, key: &KadId) -> Result<Address, DhtError> {
        self.wait_running()?;
        if let Some(addrs) = self.store.values(key) {
            if let Some(addr) = pick_local(&addrs, self.self_addr) {
                return Ok(addr);
            }
        }
        let result = self.run_lookup(key, true);
        match result.values {
            Some(addrs) => Ok(pick_remote(&addrs, self.self_addr)),
            None => Ok(Address::INVALID),
        }
    }

    /// Whether `key` is currently registered on this node.
    pub fn is_registered(&self, key: &KadId) -> bool {
        self.store.has_ref(key)
    }

    /// This instance's node id, once bootstrapped or joined.
    pub fn id(&self) -> Option<KadId> {
        self.local_id_opt()
    }

    /// Cooperatively shuts down: signals the worker, joins it, and cancels
    /// any request still awaiting a response so callers blocked in
    /// [`PendingRequest::wait`] wake immediately.
    pub fn stop(&self) {
        self.shutdown.signal();
        self.set_state(DhtState::Shutdown);
        if let Some(handle) = self.worker.lock().expect("dht worker handle lock poisoned").take() {
            let _ = handle.join();
        }
        let requests = self.requests.lock().expect("dht requests lock poisoned");
        for req in requests.values() {
            req.cancel();
        }
    }

    // -- internal plumbing, shared with lookup.rs --

    pub(crate) fn self_addr(&self) -> Address {
        self.self_addr
    }

    pub(crate) fn config(&self) -> KadConfig {
        *self.config.lock().expect("dht config lock poisoned")
    }

    pub(crate) fn buckets_closest(&self, target: &KadId, count: usize) -> Vec<Contact> {
        self.buckets.read().expect("dht buckets lock poisoned").closest(target, count)
    }

    pub(crate) fn send_kad_request(
        &self,
        target_id: KadId,
        target_addr: Address,
        payload: Payload,
        timeout: Duration,
    ) -> RequestOutcome {
        let cookie = self.alloc_cookie();
        let msg = self.build_message(cookie, None, payload);
        let now = self.clock.now_secs();
        let pending = Arc::new(PendingRequest::new(target_id, target_addr, now));
        self.requests
            .lock()
            .expect("dht requests lock poisoned")
            .insert(cookie, Arc::clone(&pending));

        let sent = match (self.transport(), self.eid()) {
            (Some(transport), Some(eid)) => transport.send(target_addr, self.qos, eid, &msg.encode()).is_ok(),
            _ => false,
        };

        let outcome = if sent { pending.wait(timeout) } else { RequestOutcome::TimedOut };

        self.requests.lock().expect("dht requests lock poisoned").remove(&cookie);
        self.free_cookie(cookie);
        if matches!(outcome, RequestOutcome::TimedOut) {
            self.dead_peer(&pending.target_id, pending.target_addr);
        }
        outcome
    }

    // -- private helpers --

    fn local_id(&self) -> KadId {
        self.local_id_opt().expect("dht id not yet assigned")
    }

    fn local_id_opt(&self) -> Option<KadId> {
        self.self_id.read().expect("dht id lock poisoned").clone()
    }

    fn transport(&self) -> Option<Arc<dyn ComponentTransport>> {
        self.transport.read().expect("dht transport lock poisoned").clone()
    }

    fn eid(&self) -> Option<Eid> {
        *self.eid.read().expect("dht eid lock poisoned")
    }

    fn alloc_cookie(&self) -> u32 {
        self.cookies.lock().expect("dht cookie pool poisoned").alloc()
    }

    fn free_cookie(&self, cookie: u32) {
        self.cookies.lock().expect("dht cookie pool poisoned").free(cookie);
    }

    fn build_message(&self, cookie: u32, in_reply_to: Option<u32>, payload: Payload) -> KadMessage {
        KadMessage {
            cookie,
            sender_id: self.local_id_opt().unwrap_or_else(|| KadId::new(vec![0; self.config().b as usize])),
            sender_addr: self.self_addr,
            in_reply_to,
            payload,
        }
    }

    fn set_state(&self, new: DhtState) {
        let mut state = self.state.lock().expect("dht state lock poisoned");
        *state = new;
        self.state_cv.notify_all();
    }

    fn set_state_init_to_joining(&self) -> Result<(), DhtError> {
        let mut state = self.state.lock().expect("dht state lock poisoned");
        if !matches!(*state, DhtState::Init) {
            return Err(DhtError::InvalidState);
        }
        *state = DhtState::Joining;
        self.state_cv.notify_all();
        Ok(())
    }

    fn wait_running(&self) -> Result<(), DhtError> {
        let mut state = self.state.lock().expect("dht state lock poisoned");
        while matches!(*state, DhtState::Joining) {
            state = self.state_cv.wait(state).expect("dht state condvar poisoned");
        }
        match *state {
            DhtState::Running => Ok(()),
            DhtState::Shutdown => Err(DhtError::Shutdown),
            DhtState::Init | DhtState::Joining => Err(DhtError::Shutdown),
        }
    }

    fn adopt_params(&self, params: KadParams) {
        let now = self.clock.now_secs();
        let new_cfg = {
            let mut cfg = self.config.lock().expect("dht config lock poisoned");
            let adopted = cfg.adopt(params.alpha, params.b, params.k as usize, params.t_expire, params.t_replicate);
            *cfg = adopted;
            adopted
        };
        *self.buckets.write().expect("dht buckets lock poisoned") =
            BucketTree::new(new_cfg.k, new_cfg.beta, new_cfg.b as usize, now);
    }

    fn dead_peer(&self, id: &KadId, addr: Address) {
        let evicted = self
            .buckets
            .write()
            .expect("dht buckets lock poisoned")
            .record_failure(id, addr, self.config().r_ping);
        if evicted {
            debug!(%addr, "dht contact evicted after repeated failures");
        }
    }

    fn publish(&self, key: KadId, addr: Address, ttl: u64) {
        let result = self.run_lookup(&key, false);
        if result.contacts.is_empty() {
            self.store_local(key, addr, ttl);
            return;
        }
        for contact in result.contacts {
            if contact.addr == self.self_addr {
                self.store_local(key.clone(), addr, ttl);
            } else {
                self.send_store(&contact, key.clone(), addr, ttl);
            }
        }
    }

    fn store_local(&self, key: KadId, addr: Address, ttl: u64) {
        let now = self.clock.now_secs();
        self.store.put(key, addr, now, ttl, self.config().t_replicate);
    }

    fn send_store(&self, contact: &Contact, key: KadId, addr: Address, ttl: u64) {
        let cookie = self.alloc_cookie();
        let msg = self.build_message(cookie, None, Payload::Store { key, addr, expiry: ttl });
        if let (Some(transport), Some(eid)) = (self.transport(), self.eid()) {
            let _ = transport.send(contact.addr, self.qos, eid, &msg.encode());
        }
        self.free_cookie(cookie);
    }

    fn handle_message(&self, buf: &[u8]) {
        let msg = match KadMessage::decode(buf) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "dropping malformed dht message");
                return;
            }
        };

        let now = self.clock.now_secs();
        if let Some(local_id) = self.local_id_opt() {
            let contact = Contact::new(msg.sender_id.clone(), msg.sender_addr, now);
            self.buckets
                .write()
                .expect("dht buckets lock poisoned")
                .update_bucket(contact, &local_id, now);
        }

        if let Some(cookie) = msg.in_reply_to {
            if let Some(pending) = self.requests.lock().expect("dht requests lock poisoned").get(&cookie).cloned() {
                pending.complete(msg);
            }
            return;
        }

        match &msg.payload {
            Payload::Join(_) => self.respond_join(&msg),
            Payload::FindNode { key } => self.respond_find_node(&msg, key),
            Payload::FindValue { key } => self.respond_find_value(&msg, key),
            Payload::Store { key, addr, expiry } => {
                self.store_local(key.clone(), *addr, *expiry);
            }
            Payload::Response(_) => {
                warn!("dropping response with no matching in_reply_to cookie");
            }
        }
    }

    fn respond_join(&self, req: &KadMessage) {
        let cfg = self.config();
        let params = KadParams {
            alpha: cfg.alpha,
            b: cfg.b,
            k: cfg.k as u32,
            t_expire: cfg.t_expire,
            t_replicate: cfg.t_replicate,
        };
        self.reply(req, Payload::Response(ResponsePayload::Join(params)));
    }

    fn respond_find_node(&self, req: &KadMessage, key: &KadId) {
        let contacts = self.buckets_closest(key, self.config().k);
        self.reply(req, Payload::Response(ResponsePayload::Contacts(contacts)));
    }

    fn respond_find_value(&self, req: &KadMessage, key: &KadId) {
        match self.store.values(key) {
            Some(addrs) => self.reply(req, Payload::Response(ResponsePayload::Values(addrs))),
            None => {
                let contacts = self.buckets_closest(key, self.config().k);
                self.reply(req, Payload::Response(ResponsePayload::Contacts(contacts)));
            }
        }
    }

    fn reply(&self, req: &KadMessage, payload: Payload) {
        let reply_msg = self.build_message(0, Some(req.cookie), payload);
        if let (Some(transport), Some(eid)) = (self.transport(), self.eid()) {
            let _ = transport.send(req.sender_addr, self.qos, eid, &reply_msg.encode());
        }
    }

    fn start_worker(self: &Arc<Self>) {
        let dht = Arc::clone(self);
        let interval = dht.config().worker_interval();
        let handle = thread::Builder::new()
            .name("dht-worker".into())
            .spawn(move || loop {
                if dht.shutdown.is_signaled() {
                    return;
                }
                dht.republish_due_refs();
                dht.expire_and_replicate();
                dht.destroy_expired_requests();
                dht.refresh_stale_buckets();
                dht.shutdown.park(interval);
            })
            .expect("failed to spawn dht-worker thread");
        *self.worker.lock().expect("dht worker handle lock poisoned") = Some(handle);
    }

    fn republish_due_refs(&self) {
        let now = self.clock.now_secs();
        let due = self.store.due_refs(now, self.config().t_republish);
        for key in due {
            self.publish(key, self.self_addr, self.config().t_expire);
        }
    }

    fn expire_and_replicate(&self) {
        let now = self.clock.now_secs();
        let due = self.store.expire_and_collect_replication(now, self.config().t_replicate);
        for (key, addr) in due {
            self.publish(key, addr, self.config().t_expire);
        }
    }

    fn destroy_expired_requests(&self) {
        let now = self.clock.now_secs();
        let limit = 2 * self.config().t_response.as_secs();
        let mut requests = self.requests.lock().expect("dht requests lock poisoned");
        let expired: Vec<u32> = requests
            .iter()
            .filter(|(_, r)| now.saturating_sub(r.created_at) > limit)
            .map(|(&cookie, _)| cookie)
            .collect();
        for cookie in expired {
            if let Some(req) = requests.remove(&cookie) {
                req.cancel();
                self.dead_peer(&req.target_id, req.target_addr);
            }
        }
    }

    fn refresh_stale_buckets(&self) {
        let now = self.clock.now_secs();
        let t_refresh = self.config().t_refresh_bucket;
        let stale = self.buckets.read().expect("dht buckets lock poisoned").stale_leaves(now, t_refresh);
        if stale.is_empty() {
            return;
        }
        {
            let mut buckets = self.buckets.write().expect("dht buckets lock poisoned");
            for leaf in &stale {
                buckets.touch(*leaf, now);
            }
        }
        if self.local_id_opt().is_some() {
            let target = KadId::random(self.config().b as usize);
            self.run_lookup(&target, false);
        }
    }
}

impl ComponentCallback for Dht {
    fn deliver(&self, payload: Vec<u8>) {
        self.handle_message(&payload);
    }
}

fn pick_local(addrs: &[Address], self_addr: Address) -> Option<Address> {
    addrs.iter().copied().find(|&a| a != self_addr).or_else(|| addrs.first().copied())
}

fn pick_remote(addrs: &[Address], self_addr: Address) -> Address {
    addrs.iter().copied().find(|&a| a != self_addr).unwrap_or(Address::INVALID)
}
