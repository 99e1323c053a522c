//! The Kademlia bucket routing table: a trie of buckets split on `beta`-bit
//! id groups.
//!
//! Modeled as an arena (`Vec<BucketNode>` plus indices) with the root
//! always at index 0, rather than buckets holding parent/child pointers
//! directly.

use crate::contact::Contact;
use crate::id::KadId;

struct BucketNode {
    contacts: Vec<Contact>,
    alts: Vec<Contact>,
    t_refr: u64,
    depth: usize,
    /// `Some` once this node has been split; length `2^beta`.
    children: Option<Vec<usize>>,
}

impl BucketNode {
    fn leaf(depth: usize, now: u64) -> Self {
        Self {
            contacts: Vec::new(),
            alts: Vec::new(),
            t_refr: now,
            depth,
            children: None,
        }
    }
}

/// The bucket trie for one DHT instance.
pub struct BucketTree {
    nodes: Vec<BucketNode>,
    k: usize,
    beta: u8,
    max_depth: usize,
}

impl BucketTree {
    /// Creates a tree with a single root bucket.
    ///
    /// `id_len_bytes` bounds the trie's depth: beyond `8 * id_len_bytes /
    /// beta` groups, every id's bit group is zero (see
    /// [`KadId::bit_group`]), so splitting further can never separate
    /// contacts and the tree stops trying.
    pub fn new(k: usize, beta: u8, id_len_bytes: usize, now: u64) -> Self {
        let max_depth = (8 * id_len_bytes) / beta.max(1) as usize;
        Self {
            nodes: vec![BucketNode::leaf(0, now)],
            k,
            beta,
            max_depth,
        }
    }

    /// Descends the trie one `beta`-bit group at a time and returns the
    /// leaf bucket index holding (or that would hold) `id`.
    pub fn iter_bucket(&self, id: &KadId) -> usize {
        let mut idx = 0usize;
        let mut depth = 0usize;
        loop {
            match &self.nodes[idx].children {
                None => return idx,
                Some(children) => {
                    let group = id.bit_group(depth, self.beta) as usize;
                    idx = children[group];
                    depth += 1;
                }
            }
        }
    }

    /// Inserts or refreshes `contact`, splitting buckets along the path to
    /// `local_id` as needed.
    pub fn update_bucket(&mut self, contact: Contact, local_id: &KadId, now: u64) {
        loop {
            let leaf = self.iter_bucket(&contact.id);

            if let Some(pos) = self.nodes[leaf]
                .contacts
                .iter()
                .position(|c| c.addr == contact.addr)
            {
                self.nodes[leaf].contacts.remove(pos);
            }

            if self.nodes[leaf].contacts.len() < self.k {
                self.nodes[leaf].contacts.push(contact);
                return;
            }

            let contains_local_prefix = self.iter_bucket(local_id) == leaf;
            let at_max_depth = self.nodes[leaf].depth >= self.max_depth;

            if contains_local_prefix && !at_max_depth {
                self.split(leaf, now);
                continue;
            }

            let alts = &mut self.nodes[leaf].alts;
            if alts.len() >= self.k {
                alts.remove(0);
            }
            alts.push(contact);
            return;
        }
    }

    fn split(&mut self, leaf: usize, now: u64) {
        let width = 1usize << self.beta;
        let depth = self.nodes[leaf].depth + 1;
        let base = self.nodes.len();
        for _ in 0..width {
            self.nodes.push(BucketNode::leaf(depth, now));
        }
        let children: Vec<usize> = (base..base + width).collect();

        let old_contacts = std::mem::take(&mut self.nodes[leaf].contacts);
        let old_alts = std::mem::take(&mut self.nodes[leaf].alts);
        self.nodes[leaf].children = Some(children.clone());

        for contact in old_contacts.into_iter().chain(old_alts) {
            let group = contact.id.bit_group(depth - 1, self.beta) as usize;
            let child = children[group];
            if self.nodes[child].contacts.len() < self.k {
                self.nodes[child].contacts.push(contact);
            } else if self.nodes[child].alts.len() < self.k {
                self.nodes[child].alts.push(contact);
            }
        }
    }

    /// Marks a failed request against `addr`'s contact; returns `true` if
    /// the contact should now be evicted (its fails exceeded the bucket's
    /// replacement policy and an alternate is available to take its
    /// place).
    pub fn record_failure(&mut self, id: &KadId, addr: unicast_core::Address, max_fails: u32) -> bool {
        let leaf = self.iter_bucket(id);
        let bucket = &mut self.nodes[leaf];
        let Some(pos) = bucket.contacts.iter().position(|c| c.addr == addr) else {
            return false;
        };
        bucket.contacts[pos].fails += 1;
        if bucket.contacts[pos].fails >= max_fails && !bucket.alts.is_empty() {
            bucket.contacts.remove(pos);
            let replacement = bucket.alts.remove(0);
            bucket.contacts.push(replacement);
            true
        } else {
            false
        }
    }

    /// The `count` contacts closest to `target`, scanning every leaf
    /// bucket. Small trees in practice (k and beta are single-digit), so a
    /// full scan plus sort is simple and adequate.
    pub fn closest(&self, target: &KadId, count: usize) -> Vec<Contact> {
        let mut all: Vec<Contact> = self
            .nodes
            .iter()
            .flat_map(|n| n.contacts.iter().cloned())
            .collect();
        all.sort_by(|a, b| target.cmp_distance(&a.id, &b.id));
        all.truncate(count);
        all
    }

    /// Every leaf bucket's refresh timestamp and id count, for the
    /// periodic worker's "refresh any bucket untouched for T_refresh".
    pub fn stale_leaves(&self, now: u64, t_refresh: u64) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.children.is_none() && now.saturating_sub(n.t_refr) > t_refresh)
            .map(|(i, _)| i)
            .collect()
    }

    /// Marks a leaf bucket as freshly refreshed.
    pub fn touch(&mut self, leaf: usize, now: u64) {
        if let Some(n) = self.nodes.get_mut(leaf) {
            n.t_refr = now;
        }
    }

    /// Contact and alternate counts in the leaf bucket holding `id`, for
    /// invariant checks.
    pub fn bucket_sizes(&self, id: &KadId) -> (usize, usize) {
        let leaf = self.iter_bucket(id);
        (self.nodes[leaf].contacts.len(), self.nodes[leaf].alts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unicast_core::Address;

    fn id_with_first_byte(b: u8) -> KadId {
        KadId::new(vec![b, 0])
    }

    #[test]
    fn single_bucket_holds_up_to_k_contacts() {
        let mut tree = BucketTree::new(2, 4, 2, 0);
        let local = id_with_first_byte(0x00);
        tree.update_bucket(Contact::new(id_with_first_byte(0x10), Address::new(1), 0), &local, 0);
        tree.update_bucket(Contact::new(id_with_first_byte(0x20), Address::new(2), 0), &local, 0);
        let (contacts, _) = tree.bucket_sizes(&id_with_first_byte(0x10));
        assert_eq!(contacts, 2);
    }

    #[test]
    fn full_bucket_on_local_path_splits_instead_of_rejecting() {
        let mut tree = BucketTree::new(1, 1, 2, 0);
        let local = id_with_first_byte(0b0000_0000);
        // Both contacts share the local id's top bit (0), forcing a split.
        tree.update_bucket(
            Contact::new(KadId::new(vec![0b0000_0000, 0]), Address::new(1), 0),
            &local,
            0,
        );
        tree.update_bucket(
            Contact::new(KadId::new(vec![0b0100_0000, 0]), Address::new(2), 0),
            &local,
            0,
        );
        // After the split, both contacts should be retained somewhere.
        let total: usize = tree
            .closest(&local, 10)
            .len();
        assert_eq!(total, 2);
    }

    #[test]
    fn record_failure_evicts_once_an_alternate_exists() {
        let mut tree = BucketTree::new(1, 4, 2, 0);
        let local = id_with_first_byte(0x00);
        tree.update_bucket(Contact::new(id_with_first_byte(0x10), Address::new(1), 0), &local, 0);
        tree.update_bucket(Contact::new(id_with_first_byte(0x11), Address::new(2), 0), &local, 0);
        // Second insert should have landed in alts (bucket full at k=1).
        let (contacts, alts) = tree.bucket_sizes(&id_with_first_byte(0x10));
        assert_eq!(contacts, 1);
        assert_eq!(alts, 1);

        let evicted = tree.record_failure(&id_with_first_byte(0x10), Address::new(1), 1);
        assert!(evicted);
        let (contacts, alts) = tree.bucket_sizes(&id_with_first_byte(0x10));
        assert_eq!(contacts, 1);
        assert_eq!(alts, 0);
    }
}
