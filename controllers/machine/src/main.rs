//! Tinkerbell Machine Controller
//!
//! Provisions TinkerbellMachines onto pre-registered Tinkerbell hardware:
//! - claims one unit of unowned Hardware per machine, honouring affinity
//! - writes the machine's bootstrap data to the Hardware user data
//! - creates the Template and Workflow that install the OS image
//! - releases the Hardware when the machine is deleted

mod affinity;
mod allocator;
mod backoff;
mod config;
mod controller;
mod error;
mod ownership;
mod probes;
mod reconciler;
mod release;
mod status;
mod template;
mod user_data;
mod watcher;
mod workflow;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting Tinkerbell Machine Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Metadata URL: {}", config.metadata_url());
    info!("  Probe address: {}", config.probe_addr);
    info!("  Requeue backoff: {:?}..{:?}", config.backoff_min, config.backoff_max);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
