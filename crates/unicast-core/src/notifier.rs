//! Process-wide publish/subscribe event bus.
//!
//! Handler registration is keyed by an explicit [`SubscriberId`] the
//! caller owns, rather than callback pointer identity, so registration
//! stays idempotent without relying on function-pointer comparison.

use crate::address::Address;
use crate::flow::FlowHandle;
use crate::qos::QosCube;
use std::sync::RwLock;

/// An event carried on the notifier bus: the events the routing policy
/// and connection manager glue exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A new data-plane N-1 flow was admitted.
    DataConnAdded {
        /// The flow's handle.
        flow: FlowHandle,
        /// The peer's layer address.
        peer: Address,
        /// Negotiated QoS cube for this flow.
        qos: QosCube,
    },
    /// A data-plane N-1 flow was torn down cleanly.
    DataConnRemoved {
        /// The flow's handle.
        flow: FlowHandle,
    },
    /// A data-plane N-1 flow became unusable (write failed).
    DataConnDown {
        /// The flow's handle.
        flow: FlowHandle,
    },
    /// A data-plane flow's QoS cube changed.
    DataConnQos {
        /// The flow's handle.
        flow: FlowHandle,
        /// The new QoS cube.
        qos: QosCube,
    },
    /// A new management-plane N-1 flow was admitted.
    MgmtConnAdded {
        /// The flow's handle.
        flow: FlowHandle,
        /// The peer's layer address.
        peer: Address,
    },
    /// A management-plane N-1 flow was torn down.
    MgmtConnRemoved {
        /// The flow's handle.
        flow: FlowHandle,
    },
}

/// Caller-owned identity for a notifier subscription, standing in for the
/// source's `(function, cookie)` pointer-identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(pub u64);

type Handler = Box<dyn Fn(&Event) + Send + Sync>;

struct Subscription {
    id: SubscriberId,
    handler: Handler,
}

/// The process-wide event bus.
///
/// Handlers run synchronously under the bus's read lock, matching the
/// spec's "Notifier: internal rwlock around the subscriber list; handlers
/// are invoked under the read side."
#[derive(Default)]
pub struct Notifier {
    subscribers: RwLock<Vec<Subscription>>,
}

impl Notifier {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Registers a handler under `id`. Idempotent: re-registering the same
    /// `id` replaces the prior handler rather than adding a second one.
    pub fn subscribe<F>(&self, id: SubscriberId, handler: F)
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut subs = self.subscribers.write().expect("notifier lock poisoned");
        if let Some(existing) = subs.iter_mut().find(|s| s.id == id) {
            existing.handler = Box::new(handler);
            return;
        }
        subs.push(Subscription {
            id,
            handler: Box::new(handler),
        });
    }

    /// Removes the handler registered under `id`, if any.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut subs = self.subscribers.write().expect("notifier lock poisoned");
        subs.retain(|s| s.id != id);
    }

    /// Publishes an event to every current subscriber, in registration
    /// order, under the bus's read lock.
    pub fn publish(&self, event: Event) {
        let subs = self.subscribers.read().expect("notifier lock poisoned");
        for sub in subs.iter() {
            (sub.handler)(&event);
        }
    }
}

/// What the out-of-scope connection manager needs from this core: a way to
/// subscribe to the notifier bus so it can react to `DataConnAdded` /
/// `MgmtConnAdded` and the rest of [`Event`] by driving its own RPC surface.
/// No concrete implementation ships here (enrollment RPC and the
/// resource-manager surface are out of scope); this is the seam a
/// harness binds to one.
pub trait ConnectionManager: Send + Sync {
    /// Registers this connection manager's handlers on `notifier`.
    fn subscribe(&self, notifier: &Notifier);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn subscribe_is_idempotent_per_id() {
        let notifier = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        notifier.subscribe(SubscriberId(1), move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = count.clone();
        notifier.subscribe(SubscriberId(1), move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });
        notifier.publish(Event::DataConnRemoved {
            flow: FlowHandle::new(1),
        });
        // Only the second registration under the same id should fire.
        assert_eq!(count.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let notifier = Notifier::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        notifier.subscribe(SubscriberId(7), move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        notifier.unsubscribe(SubscriberId(7));
        notifier.publish(Event::DataConnRemoved {
            flow: FlowHandle::new(1),
        });
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
