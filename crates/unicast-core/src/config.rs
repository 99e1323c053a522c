//! Layer bootstrap configuration.
//!
//! Stands in for the out-of-scope CDAP enrollment exchange: these fields
//! are negotiated once, at layer bootstrap, and stay constant for the
//! layer's life.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Routing policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingPolicy {
    /// Single-path Dijkstra.
    Simple,
    /// Dijkstra plus loop-free alternates.
    Lfa,
    /// Dijkstra plus equal-cost multipath.
    Ecmp,
}

/// Forwarding-table policy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PffPolicy {
    /// One next hop per destination.
    Single,
    /// Multiple next hops per destination (ECMP/LFA backups).
    Multi,
}

/// Errors constructing a [`BootstrapConfig`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `addr_size` outside `1..=8`.
    #[error("addr_size must be in 1..=8, got {0}")]
    InvalidAddrSize(u8),
    /// `eid_size` outside `1..=8`.
    #[error("eid_size must be in 1..=8, got {0}")]
    InvalidEidSize(u8),
    /// `max_ttl` outside `1..=255`.
    #[error("max_ttl must be in 1..=255, got {0}")]
    InvalidMaxTtl(u16),
    /// DHT hash length below the 8-byte floor.
    #[error("dht hash length b must be >= 8, got {0}")]
    InvalidHashLen(u8),
}

/// Layer bootstrap configuration, negotiated once and constant thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    /// Width in bytes of the `dst_addr` header field, `1..=8`.
    pub addr_size: u8,
    /// Width in bytes of the `eid` header field, `1..=8`.
    pub eid_size: u8,
    /// Initial TTL stamped on locally-originated packets, `1..=255`.
    pub max_ttl: u8,
    /// Routing policy for this layer.
    pub routing_policy: RoutingPolicy,
    /// PFF storage policy for this layer.
    pub pff_policy: PffPolicy,
    /// DHT content-address hash length in bytes, `>= 8`.
    pub dht_hash_len: u8,
}

impl BootstrapConfig {
    /// Validates field ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=8).contains(&self.addr_size) {
            return Err(ConfigError::InvalidAddrSize(self.addr_size));
        }
        if !(1..=8).contains(&self.eid_size) {
            return Err(ConfigError::InvalidEidSize(self.eid_size));
        }
        if self.max_ttl == 0 {
            return Err(ConfigError::InvalidMaxTtl(self.max_ttl as u16));
        }
        if self.dht_hash_len < 8 {
            return Err(ConfigError::InvalidHashLen(self.dht_hash_len));
        }
        Ok(())
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            addr_size: 4,
            eid_size: 2,
            max_ttl: 60,
            routing_policy: RoutingPolicy::Simple,
            pff_policy: PffPolicy::Single,
            dht_hash_len: 20,
        }
    }
}
