#![warn(missing_docs)]

//! Runs one unicast IPCP layer member: loads its config, builds and
//! starts the subsystems, then waits for a shutdown signal.

use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use unicast_core::SystemClock;
use unicast_node::config::NodeConfig;
use unicast_node::System;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| "unicast-node.toml".into());
    let config = match NodeConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(path = %config_path, error = %e, "no usable config file, starting with defaults");
            NodeConfig::default()
        }
    };

    tracing::info!(self_addr = config.self_addr, "unicast layer member starting");

    let system = System::build(&config, Arc::new(SystemClock));
    system.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, stopping subsystems");
    system.stop();

    Ok(())
}
