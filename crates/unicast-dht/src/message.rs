//! Kademlia wire messages: bincode-framed records carrying a code, cookie,
//! sender identity, and a code-specific payload.

use crate::contact::Contact;
use crate::id::KadId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use unicast_core::Address;

/// Errors (de)serializing a DHT message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// bincode rejected the buffer.
    #[error("malformed dht message: {0}")]
    Malformed(String),
}

/// Bootstrap parameters exchanged in a JOIN/RESPONSE pair
/// protocol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KadParams {
    /// Lookup parallelism.
    pub alpha: u32,
    /// Id length in bytes.
    pub b: u8,
    /// Bucket capacity / replication factor.
    pub k: u32,
    /// Value expiry period, seconds.
    pub t_expire: u64,
    /// Replication period, seconds.
    pub t_replicate: u64,
}

/// The code-specific payload of a request or response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    /// `JOIN`: propose bootstrap parameters.
    Join(KadParams),
    /// `FIND_NODE`: look up contacts near a key.
    FindNode {
        /// The target key.
        key: KadId,
    },
    /// `FIND_VALUE`: look up values (or contacts) for a key.
    FindValue {
        /// The target key.
        key: KadId,
    },
    /// `STORE`: publish one value for a key, with no response expected.
    Store {
        /// The key being published.
        key: KadId,
        /// The address to store.
        addr: Address,
        /// Seconds until the stored value expires.
        expiry: u64,
    },
    /// `RESPONSE`: the answer to a prior request, identified by cookie.
    Response(ResponsePayload),
}

/// The answer carried in a `RESPONSE` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponsePayload {
    /// Answers a JOIN: the responder's own bootstrap parameters.
    Join(KadParams),
    /// Answers a FIND_NODE: up to `k` closest contacts.
    Contacts(Vec<Contact>),
    /// Answers a FIND_VALUE that found stored values.
    Values(Vec<Address>),
}

/// One Kademlia message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KadMessage {
    /// Cookie unique to the sender, echoed by the responder.
    pub cookie: u32,
    /// The sender's own node id.
    pub sender_id: KadId,
    /// The sender's layer address.
    pub sender_addr: Address,
    /// The cookie this message answers, for `RESPONSE` messages.
    pub in_reply_to: Option<u32>,
    /// The message body.
    pub payload: Payload,
}

impl KadMessage {
    /// Serializes to bytes for transport over DT.
    pub fn encode(&self) -> Vec<u8> {
        bincode::serialize(self).expect("KadMessage always serializes")
    }

    /// Deserializes a message off the wire.
    pub fn decode(buf: &[u8]) -> Result<Self, MessageError> {
        bincode::deserialize(buf).map_err(|e| MessageError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_node_round_trips() {
        let msg = KadMessage {
            cookie: 42,
            sender_id: KadId::new(vec![1, 2, 3, 4, 5, 6, 7, 8]),
            sender_addr: Address::new(9),
            in_reply_to: None,
            payload: Payload::FindNode {
                key: KadId::new(vec![9, 9, 9, 9, 9, 9, 9, 9]),
            },
        };
        let encoded = msg.encode();
        let decoded = KadMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(KadMessage::decode(&[0xff, 0x01]).is_err());
    }
}
