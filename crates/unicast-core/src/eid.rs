//! Endpoint identifiers (EIDs).

use crate::limits::RESERVED_EID_MAX;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An endpoint identifier, local to a destination address.
///
/// Values below [`RESERVED_EID_MAX`] identify internal components
/// (routing, DHT, management); all other values identify flow endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Eid(u64);

impl Eid {
    /// Wraps a raw value.
    pub fn new(raw: u64) -> Self {
        Eid(raw)
    }

    /// Returns the raw value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this EID addresses a reserved internal component rather than
    /// a flow endpoint.
    pub fn is_reserved(self) -> bool {
        self.0 < RESERVED_EID_MAX
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Eid {
    fn from(raw: u64) -> Self {
        Eid(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_threshold() {
        assert!(Eid::new(0).is_reserved());
        assert!(Eid::new(RESERVED_EID_MAX - 1).is_reserved());
        assert!(!Eid::new(RESERVED_EID_MAX).is_reserved());
    }
}
