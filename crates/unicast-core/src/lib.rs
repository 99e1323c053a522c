#![warn(missing_docs)]

//! Shared types and glue for the unicast IPCP core: addressing, EIDs, QoS
//! cubes, the flow/transport seams, the notifier bus, bootstrap
//! configuration, and the top-level error taxonomy.

pub mod address;
pub mod clock;
pub mod config;
pub mod eid;
pub mod error;
pub mod flow;
pub mod flowset;
pub mod limits;
pub mod notifier;
pub mod qos;
pub mod shutdown;
pub mod transport;

pub use address::{Address, AddressAuthority, FlatRandomAuthority};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::{BootstrapConfig, ConfigError, PffPolicy, RoutingPolicy};
pub use eid::Eid;
pub use error::{CoreError, Result};
pub use flow::{Flow, FlowError, FlowHandle};
pub use flowset::FlowSet;
pub use notifier::{ConnectionManager, Event, Notifier, SubscriberId};
pub use qos::QosCube;
pub use shutdown::ShutdownSignal;
pub use transport::{ComponentCallback, ComponentTransport};
