//! DevWorkspace Controller
//!
//! Turns `DevWorkspace` resources into running workspaces:
//! - resolves devfile components and plugins into containers
//! - provisions storage, RBAC, routing, a service account and the deployment, in order
//! - stops workspaces by scaling them down and cleans up routing on deletion
//!
//! Also serves Prometheus metrics, health probes and the admission webhooks.

mod admission;
mod backoff;
mod config;
mod controller;
mod devfile;
mod error;
mod metrics;
mod provision;
mod readiness;
mod reconciler;
mod server;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    init_tracing();

    // kube and reqwest both use rustls; pin the ring provider once for the process
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting DevWorkspace Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Default routing class: {}", config.default_routing_class);
    info!("  Listen address: {}", config.metrics_addr);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
