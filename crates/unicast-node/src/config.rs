//! Harness configuration: one TOML/JSON file combining the layer's
//! [`BootstrapConfig`], this member's own address, its QoS cubes, the
//! routing timers, and where to find a peer to join the DHT through.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use unicast_core::{BootstrapConfig, ConfigError};
use unicast_routing::timers::RoutingTimers;

/// Errors loading or validating a [`NodeConfig`].
#[derive(Error, Debug)]
pub enum NodeConfigError {
    /// The file couldn't be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file's extension isn't one this loader understands.
    #[error("unsupported config file extension: {0}")]
    UnsupportedExtension(String),
    /// TOML parsing failed.
    #[error("invalid toml: {0}")]
    Toml(#[from] toml::de::Error),
    /// The embedded [`BootstrapConfig`] failed its own validation.
    #[error(transparent)]
    Bootstrap(#[from] ConfigError),
}

/// Durations for the routing timers as they appear on disk, since
/// [`std::time::Duration`] doesn't implement [`Deserialize`] the way a
/// plain integer count of seconds does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTimersConfig {
    /// Seconds between flood/age-out sweeps.
    pub ls_update_secs: u64,
    /// Seconds an adjacency may go unrefreshed before it's dropped.
    pub ls_timeo_secs: u64,
    /// Seconds between PFF recalculations.
    pub recalc_secs: u64,
}

impl Default for RoutingTimersConfig {
    fn default() -> Self {
        let defaults = RoutingTimers::default();
        Self {
            ls_update_secs: defaults.ls_update_time.as_secs(),
            ls_timeo_secs: defaults.ls_timeo.as_secs(),
            recalc_secs: defaults.recalc_time.as_secs(),
        }
    }
}

impl RoutingTimersConfig {
    /// Converts to the engine's [`RoutingTimers`].
    pub fn to_timers(self) -> RoutingTimers {
        RoutingTimers {
            ls_update_time: std::time::Duration::from_secs(self.ls_update_secs),
            ls_timeo: std::time::Duration::from_secs(self.ls_timeo_secs),
            recalc_time: std::time::Duration::from_secs(self.recalc_secs),
        }
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This member's layer address.
    pub self_addr: u64,
    /// QoS cubes this member serves, as raw cube ids.
    pub qos_cubes: Vec<u8>,
    /// Layer-wide bootstrap parameters.
    #[serde(flatten)]
    pub bootstrap: BootstrapConfig,
    /// Routing policy timer periods.
    #[serde(default)]
    pub routing_timers: RoutingTimersConfig,
    /// Kademlia DHT parameter overrides, keyed the way [`KadConfig::adopt`]
    /// takes them; `None` uses the bootstrap defaults derived from
    /// `dht_hash_len`.
    #[serde(default)]
    pub dht: Option<DhtOverrides>,
    /// Address of an existing member to join the DHT through. Absent on
    /// the first node of a layer, which bootstraps instead.
    #[serde(default)]
    pub join_peer: Option<u64>,
}

/// Subset of [`unicast_dht::KadConfig`]'s fields an operator is expected to
/// tune; the rest follow the protocol's fixed defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhtOverrides {
    /// Parallelism factor for lookups.
    pub alpha: u32,
    /// Bucket replication factor.
    pub k: usize,
    /// Seconds before a stored value expires without republishing.
    pub t_expire: u64,
    /// Seconds between store replication sweeps.
    pub t_replicate: u64,
}

impl NodeConfig {
    /// Loads and validates a config from `path`, dispatching on its file
    /// extension the way the management harness this is modeled on does.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, NodeConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let cfg: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&raw)?,
            Some(other) => return Err(NodeConfigError::UnsupportedExtension(other.to_string())),
            None => return Err(NodeConfigError::UnsupportedExtension(String::new())),
        };
        cfg.bootstrap.validate()?;
        Ok(cfg)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            self_addr: 1,
            qos_cubes: vec![0],
            bootstrap: BootstrapConfig::default(),
            routing_timers: RoutingTimersConfig::default(),
            dht: None,
            join_peer: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_minimal_toml_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
            self_addr = 7
            qos_cubes = [0, 1]
            addr_size = 4
            eid_size = 2
            max_ttl = 60
            routing_policy = "lfa"
            pff_policy = "multi"
            dht_hash_len = 20
            join_peer = 1
            "#
        )
        .unwrap();
        let cfg = NodeConfig::from_file(file.path()).unwrap();
        assert_eq!(cfg.self_addr, 7);
        assert_eq!(cfg.qos_cubes, vec![0, 1]);
        assert_eq!(cfg.join_peer, Some(1));
        assert_eq!(cfg.bootstrap.routing_policy, unicast_core::RoutingPolicy::Lfa);
    }

    #[test]
    fn rejects_an_invalid_bootstrap_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
            self_addr = 1
            qos_cubes = [0]
            addr_size = 0
            eid_size = 2
            max_ttl = 60
            routing_policy = "simple"
            pff_policy = "single"
            dht_hash_len = 20
            "#
        )
        .unwrap();
        let err = NodeConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, NodeConfigError::Bootstrap(_)));
    }

    #[test]
    fn rejects_an_unsupported_extension() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{}}").unwrap();
        let err = NodeConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, NodeConfigError::UnsupportedExtension(_)));
    }
}
