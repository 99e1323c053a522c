//! The Kademlia request state machine.
//!
//! States: `INIT -> PENDING -> {RESPONSE | timeout} -> DONE`, with a
//! `DESTROY` transition for cooperative cancellation on shutdown. Driven
//! by a condition variable per request rather than a polled future, since
//! nothing else in this crate is async.

use crate::id::KadId;
use crate::message::KadMessage;
use std::sync::{Condvar, Mutex};
use std::time::Duration;
use unicast_core::Address;

/// Why a request finished.
#[derive(Debug, Clone)]
pub enum RequestOutcome {
    /// A RESPONSE carrying a matching `in_reply_to` cookie arrived.
    Responded(KadMessage),
    /// No response arrived before the deadline.
    TimedOut,
    /// The request was torn down out from under its waiter (shutdown).
    Cancelled,
}

enum Slot {
    Pending,
    Done(RequestOutcome),
}

/// One outstanding request awaiting a cookie-matched response.
pub struct PendingRequest {
    /// The contact this request targets, for dead-peer bookkeeping on
    /// timeout.
    pub target_id: KadId,
    /// The contact's layer address.
    pub target_addr: Address,
    /// When this request was issued, for the periodic worker's `t_exp`
    /// sweep.
    pub created_at: u64,
    slot: Mutex<Slot>,
    condvar: Condvar,
}

impl PendingRequest {
    /// Creates a request in the `PENDING` state.
    pub fn new(target_id: KadId, target_addr: Address, created_at: u64) -> Self {
        Self {
            target_id,
            target_addr,
            created_at,
            slot: Mutex::new(Slot::Pending),
            condvar: Condvar::new(),
        }
    }

    /// Delivers a matched RESPONSE, waking the waiter. A no-op once the
    /// request has already resolved (timed out, cancelled, or already
    /// responded).
    pub fn complete(&self, msg: KadMessage) {
        let mut slot = self.slot.lock().expect("dht request slot poisoned");
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Done(RequestOutcome::Responded(msg));
            self.condvar.notify_all();
        }
    }

    /// The `DESTROY` transition: cooperatively cancels a still-pending
    /// request so its waiter (if any) wakes instead of blocking until
    /// `t_response`.
    pub fn cancel(&self) {
        let mut slot = self.slot.lock().expect("dht request slot poisoned");
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Done(RequestOutcome::Cancelled);
            self.condvar.notify_all();
        }
    }

    /// Blocks until a response arrives, the request is cancelled, or
    /// `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> RequestOutcome {
        let slot = self.slot.lock().expect("dht request slot poisoned");
        let (mut slot, _) = self
            .condvar
            .wait_timeout_while(slot, timeout, |s| matches!(s, Slot::Pending))
            .expect("dht request condvar poisoned");
        match std::mem::replace(&mut *slot, Slot::Done(RequestOutcome::TimedOut)) {
            Slot::Done(outcome) => outcome,
            Slot::Pending => RequestOutcome::TimedOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{KadMessage, Payload};

    fn msg() -> KadMessage {
        KadMessage {
            cookie: 1,
            sender_id: KadId::new(vec![1, 2, 3]),
            sender_addr: Address::new(7),
            in_reply_to: Some(1),
            payload: Payload::FindNode {
                key: KadId::new(vec![9]),
            },
        }
    }

    #[test]
    fn wait_times_out_when_nothing_completes_it() {
        let req = PendingRequest::new(KadId::new(vec![0]), Address::new(1), 0);
        let outcome = req.wait(Duration::from_millis(20));
        assert!(matches!(outcome, RequestOutcome::TimedOut));
    }

    #[test]
    fn complete_before_wait_is_observed_immediately() {
        let req = PendingRequest::new(KadId::new(vec![0]), Address::new(1), 0);
        req.complete(msg());
        let outcome = req.wait(Duration::from_secs(5));
        assert!(matches!(outcome, RequestOutcome::Responded(_)));
    }

    #[test]
    fn cancel_after_complete_is_a_no_op() {
        let req = PendingRequest::new(KadId::new(vec![0]), Address::new(1), 0);
        req.complete(msg());
        req.cancel();
        assert!(matches!(req.wait(Duration::from_secs(1)), RequestOutcome::Responded(_)));
    }
}
