//! The link-state message wire format: two big-endian-packed
//! address fields, `s_addr` and `d_addr`.

use thiserror::Error;
use unicast_core::Address;

/// Upper bound on an encoded link-state message, sized for the widest
/// negotiable address (8 bytes each).
pub const LSM_MAX_LEN: usize = 16;

/// Errors decoding a link-state message off the wire.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsmError {
    /// The buffer didn't hold exactly `2 * addr_size` bytes.
    #[error("malformed link-state message: expected {expected} bytes, got {got}")]
    Malformed {
        /// Bytes expected for the negotiated `addr_size`.
        expected: usize,
        /// Bytes actually present.
        got: usize,
    },
}

/// One link-state announcement: "`s_addr` has an announced edge to `d_addr`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStateMessage {
    /// The announcing side of the edge.
    pub s_addr: Address,
    /// The announced side of the edge.
    pub d_addr: Address,
}

impl LinkStateMessage {
    /// Packs into `2 * addr_size` big-endian bytes.
    pub fn encode(&self, addr_size: u8) -> Vec<u8> {
        let n = addr_size as usize;
        let mut out = Vec::with_capacity(2 * n);
        out.extend_from_slice(&self.s_addr.as_u64().to_be_bytes()[8 - n..]);
        out.extend_from_slice(&self.d_addr.as_u64().to_be_bytes()[8 - n..]);
        out
    }

    /// Unpacks `2 * addr_size` big-endian bytes.
    pub fn decode(buf: &[u8], addr_size: u8) -> Result<Self, LsmError> {
        let n = addr_size as usize;
        if buf.len() != 2 * n {
            return Err(LsmError::Malformed {
                expected: 2 * n,
                got: buf.len(),
            });
        }
        let s_addr = be_bytes_to_u64(&buf[..n]);
        let d_addr = be_bytes_to_u64(&buf[n..]);
        Ok(LinkStateMessage {
            s_addr: Address::new(s_addr),
            d_addr: Address::new(d_addr),
        })
    }
}

fn be_bytes_to_u64(buf: &[u8]) -> u64 {
    let mut acc = 0u64;
    for &b in buf {
        acc = (acc << 8) | b as u64;
    }
    acc
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // The same round-trip law as the DT-PCI header codec applies
        // equally to the link-state message's own header.
        #[test]
        fn lsm_round_trips_for_any_addr_size(
            addr_size in 1u8..=8,
            s_raw in any::<u64>(),
            d_raw in any::<u64>(),
        ) {
            let mask = if addr_size >= 8 { u64::MAX } else { (1u64 << (addr_size * 8)) - 1 };
            let msg = LinkStateMessage {
                s_addr: Address::new(s_raw & mask),
                d_addr: Address::new(d_raw & mask),
            };
            let encoded = msg.encode(addr_size);
            let decoded = LinkStateMessage::decode(&encoded, addr_size).unwrap();
            prop_assert_eq!(decoded, msg);
        }
    }
}
