//! Layer member addressing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 64-bit address identifying a member of the unicast layer.
///
/// `0` is reserved to mean "invalid" / "unassigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(u64);

impl Address {
    /// The reserved invalid address.
    pub const INVALID: Address = Address(0);

    /// Wraps a raw value. `0` is accepted but is always invalid.
    pub fn new(raw: u64) -> Self {
        Address(raw)
    }

    /// Returns the raw value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this address is the reserved invalid value.
    pub fn is_invalid(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(raw: u64) -> Self {
        Address(raw)
    }
}

/// Assigns addresses to new layer members.
///
/// This core ships a flat-random policy; other policies (e.g.
/// hierarchical) are out of scope but the trait seam is kept so a future
/// policy can be dropped in without touching callers.
pub trait AddressAuthority: Send + Sync {
    /// Produces a fresh, non-zero address.
    fn assign(&self) -> Address;
}

/// Flat-random address authority: draws a uniform random non-zero `u64`.
#[derive(Debug, Default)]
pub struct FlatRandomAuthority;

impl AddressAuthority for FlatRandomAuthority {
    fn assign(&self) -> Address {
        loop {
            let raw: u64 = rand::random();
            if raw != 0 {
                return Address(raw);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_is_zero() {
        assert!(Address::INVALID.is_invalid());
        assert!(Address::new(0).is_invalid());
        assert!(!Address::new(1).is_invalid());
    }

    #[test]
    fn flat_random_never_zero() {
        let auth = FlatRandomAuthority;
        for _ in 0..1000 {
            assert!(!auth.assign().is_invalid());
        }
    }
}
