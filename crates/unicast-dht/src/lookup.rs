//! The Kademlia lookup state machine.
//!
//! States: `INIT -> PENDING -> UPDATE -> COMPLETE`, with an early
//! short-circuit to `COMPLETE` on the first value-carrying response.
//! Modeled here as a single bounded driving loop on [`Dht::run_lookup`]
//! rather than a long-lived object with a `DESTROY` transition: every
//! lookup in this core runs to completion (or its deadline) inside the
//! call that started it, so there is never a detached lookup for shutdown
//! to tear down out from under a caller.

use crate::contact::Contact;
use crate::id::KadId;
use crate::message::{Payload, ResponsePayload};
use crate::request::RequestOutcome;
use crate::Dht;
use std::collections::HashSet;
use std::thread;
use std::time::Instant;
use unicast_core::Address;

/// What a lookup produced.
#[derive(Debug, Clone, Default)]
pub struct LookupResult {
    /// The closest contacts found, ordered by distance to the target.
    pub contacts: Vec<Contact>,
    /// Addresses from the first value-carrying response, for a
    /// FIND_VALUE lookup that found the key.
    pub values: Option<Vec<Address>>,
}

impl Dht {
    /// Drives a FIND_NODE (`want_value = false`) or FIND_VALUE
    /// (`want_value = true`) lookup for `target` to completion.
    pub(crate) fn run_lookup(&self, target: &KadId, want_value: bool) -> LookupResult {
        let cfg = self.config();
        let alpha = cfg.alpha as usize;
        let k = cfg.k;
        let deadline = Instant::now() + cfg.t_response;

        let mut closest: Vec<Contact> = self
            .buckets_closest(target, k)
            .into_iter()
            .filter(|c| c.addr != self.self_addr())
            .collect();
        let mut queried: HashSet<Address> = HashSet::new();

        loop {
            let round: Vec<Contact> = closest
                .iter()
                .filter(|c| !queried.contains(&c.addr))
                .take(alpha)
                .cloned()
                .collect();
            if round.is_empty() || Instant::now() >= deadline {
                break;
            }
            for c in &round {
                queried.insert(c.addr);
            }

            let mut responses: Vec<(Contact, RequestOutcome)> = Vec::new();
            thread::scope(|scope| {
                let handles: Vec<_> = round
                    .iter()
                    .map(|c| {
                        let contact = c.clone();
                        let target = target.clone();
                        scope.spawn(move || {
                            let payload = if want_value {
                                Payload::FindValue { key: target }
                            } else {
                                Payload::FindNode { key: target }
                            };
                            let outcome = self.send_kad_request(
                                contact.id.clone(),
                                contact.addr,
                                payload,
                                cfg.t_response,
                            );
                            (contact, outcome)
                        })
                    })
                    .collect();
                for h in handles {
                    if let Ok(pair) = h.join() {
                        responses.push(pair);
                    }
                }
            });

            let mut progressed = false;
            for (_contact, outcome) in responses {
                if let RequestOutcome::Responded(msg) = outcome {
                    match msg.payload {
                        Payload::Response(ResponsePayload::Contacts(contacts)) => {
                            for nc in contacts {
                                if nc.addr == self.self_addr() {
                                    continue;
                                }
                                if merge_candidate(&mut closest, nc, target, k) {
                                    progressed = true;
                                }
                            }
                        }
                        Payload::Response(ResponsePayload::Values(addrs)) => {
                            return LookupResult {
                                contacts: closest,
                                values: Some(addrs),
                            };
                        }
                        _ => {}
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        LookupResult {
            contacts: closest,
            values: None,
        }
    }
}

/// Inserts `candidate` into `closest` (bounded to `k`, closest-first) if
/// it's new. Returns whether it survived the truncation -- i.e. whether
/// it's among the `k` closest known so far, the signal the driving loop
/// uses to decide whether a round made progress.
fn merge_candidate(closest: &mut Vec<Contact>, candidate: Contact, target: &KadId, k: usize) -> bool {
    if closest.iter().any(|c| c.addr == candidate.addr) {
        return false;
    }
    let addr = candidate.addr;
    closest.push(candidate);
    closest.sort_by(|a, b| target.cmp_distance(&a.id, &b.id));
    closest.truncate(k);
    closest.iter().any(|c| c.addr == addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_candidate_keeps_only_k_closest() {
        let target = KadId::new(vec![0, 0]);
        let mut closest = vec![Contact::new(KadId::new(vec![0, 1]), Address::new(1), 0)];
        let far = Contact::new(KadId::new(vec![1, 0]), Address::new(2), 0);
        assert!(!merge_candidate(&mut closest, far, &target, 1));
        assert_eq!(closest.len(), 1);
        assert_eq!(closest[0].addr, Address::new(1));
    }

    #[test]
    fn merge_candidate_rejects_duplicates() {
        let target = KadId::new(vec![0, 0]);
        let mut closest = vec![Contact::new(KadId::new(vec![0, 1]), Address::new(1), 0)];
        let dup = Contact::new(KadId::new(vec![0, 1]), Address::new(1), 0);
        assert!(!merge_candidate(&mut closest, dup, &target, 4));
        assert_eq!(closest.len(), 1);
    }
}
