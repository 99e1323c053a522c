//! Kademlia node/key identifiers: fixed-length bitstrings with XOR
//! distance.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A node or content-address id, `b` bytes long (negotiated at bootstrap).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KadId(Vec<u8>);

impl KadId {
    /// Wraps raw bytes as an id.
    pub fn new(bytes: Vec<u8>) -> Self {
        KadId(bytes)
    }

    /// Draws a random id of length `b` bytes.
    pub fn random(b: usize) -> Self {
        let mut bytes = vec![0u8; b];
        rand::thread_rng().fill_bytes(&mut bytes);
        KadId(bytes)
    }

    /// Derives the content-address id for `name`, `b` bytes long. Uses
    /// blake3's extendable output so `b` can be any negotiated width, not
    /// just 32.
    pub fn from_name(name: &str, b: usize) -> Self {
        let mut reader = blake3::Hasher::new().update(name.as_bytes()).finalize_xof();
        let mut bytes = vec![0u8; b];
        reader.fill(&mut bytes);
        KadId(bytes)
    }

    /// Raw byte view.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this id is empty (zero-length, never valid for `b >= 8`).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bitwise XOR distance to `other`, treated as a big-endian integer for
    /// ordering purposes (see [`KadId::cmp_distance`]).
    pub fn distance(&self, other: &KadId) -> Vec<u8> {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a ^ b)
            .collect()
    }

    /// Compares two ids by their XOR distance to `self`, closest first.
    pub fn cmp_distance(&self, a: &KadId, b: &KadId) -> Ordering {
        let da = self.distance(a);
        let db = self.distance(b);
        da.cmp(&db)
    }

    /// The value of the `beta`-bit group starting at bit offset `depth *
    /// beta`, used to descend the bucket trie one group at a time.
    pub fn bit_group(&self, depth: usize, beta: u8) -> u8 {
        let beta = beta as usize;
        let bit_offset = depth * beta;
        let byte_idx = bit_offset / 8;
        if byte_idx >= self.0.len() {
            return 0;
        }
        // Extract `beta` bits starting at `bit_offset`, assuming beta <= 8
        // and bit_offset % 8 + beta <= 8 when beta divides 8 evenly (the
        // only values this is ever configured with: 1, 2, 4, 8).
        let bit_in_byte = bit_offset % 8;
        let byte = self.0[byte_idx];
        let shift = 8 - bit_in_byte - beta;
        (byte >> shift) & ((1u16 << beta) - 1) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let id = KadId::new(vec![1, 2, 3]);
        assert_eq!(id.distance(&id), vec![0, 0, 0]);
    }

    #[test]
    fn closer_id_sorts_first() {
        let target = KadId::new(vec![0, 0]);
        let near = KadId::new(vec![0, 1]);
        let far = KadId::new(vec![1, 0]);
        assert_eq!(target.cmp_distance(&near, &far), Ordering::Less);
    }

    #[test]
    fn from_name_is_deterministic_and_sized() {
        let a = KadId::from_name("widget-42", 20);
        let b = KadId::from_name("widget-42", 20);
        assert_eq!(a, b);
        assert_eq!(a.len(), 20);

        let other = KadId::from_name("widget-43", 20);
        assert_ne!(a, other);
    }

    #[test]
    fn bit_group_splits_a_byte_into_beta_chunks() {
        let id = KadId::new(vec![0b1011_0010]);
        assert_eq!(id.bit_group(0, 4), 0b1011);
        assert_eq!(id.bit_group(1, 4), 0b0010);
        assert_eq!(id.bit_group(0, 1), 1);
        assert_eq!(id.bit_group(1, 1), 0);
    }
}
