//! QoS cubes: independent forwarding planes.

use crate::limits::MAX_QOS_CUBES;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of an independent QoS forwarding plane (the "QoS cube").
///
/// Bounded by [`MAX_QOS_CUBES`]; each cube gets its own forwarding table
/// and its own routing recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QosCube(u8);

impl QosCube {
    /// Wraps a raw cube index.
    ///
    /// # Panics
    /// Panics if `raw as usize >= MAX_QOS_CUBES`; cube indices are assigned
    /// internally from bootstrap configuration, never from untrusted wire
    /// data without a prior range check (see `unicast-dt`'s header codec).
    pub fn new(raw: u8) -> Self {
        assert!((raw as usize) < MAX_QOS_CUBES, "qos cube out of range");
        QosCube(raw)
    }

    /// Returns the raw index.
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Returns the raw index as `usize`, suitable for array indexing.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Iterates every cube in `[0, bound)`.
    pub fn range(bound: u8) -> impl Iterator<Item = QosCube> {
        (0..bound).map(QosCube)
    }
}

impl fmt::Display for QosCube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "qos{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic]
    fn rejects_out_of_range() {
        QosCube::new(MAX_QOS_CUBES as u8);
    }

    #[test]
    fn range_is_exclusive() {
        let cubes: Vec<_> = QosCube::range(3).map(|q| q.as_u8()).collect();
        assert_eq!(cubes, vec![0, 1, 2]);
    }
}
