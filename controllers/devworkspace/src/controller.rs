//! Main controller implementation.
//!
//! Builds the shared pieces (cluster client, configuration, metrics, reconciler) and
//! runs the DevWorkspace watcher next to the HTTP server for metrics, health probes
//! and admission webhooks. Either task ending stops the controller.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::readiness::HttpReadinessProbe;
use crate::reconciler::Reconciler;
use crate::server::{self, ServerState};
use crate::watcher;
use cluster_client::{ClusterClient, KubeClusterClient};
use kube::Client;
use routing::SolverRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// API group whose presence marks an OpenShift cluster
const OPENSHIFT_ROUTE_GROUP: &str = "route.openshift.io";

/// Per-request timeout of the workspace readiness probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Main controller for DevWorkspace management.
pub struct Controller {
    workspace_watcher: JoinHandle<Result<(), ControllerError>>,
    http_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing DevWorkspace Controller");

        let kube_client = Client::try_default().await?;
        let cluster = KubeClusterClient::new(kube_client.clone());

        let probed = match cluster.api_group_available(OPENSHIFT_ROUTE_GROUP).await {
            Ok(available) => available,
            Err(e) => {
                warn!(
                    "Failed to probe for {}: {}; assuming a vanilla cluster",
                    OPENSHIFT_ROUTE_GROUP, e
                );
                false
            }
        };
        let config = config.with_openshift(probed);
        config.validate()?;
        config.log_summary();
        let config = Arc::new(config);

        let metrics = Arc::new(Metrics::new().map_err(|e| {
            ControllerError::InvalidConfig(format!("failed to register metrics: {e}"))
        })?);
        let probe = Arc::new(HttpReadinessProbe::new(PROBE_TIMEOUT)?);
        let reconciler = Arc::new(Reconciler::new(cluster, config.clone(), probe, metrics.clone()));

        let state = ServerState {
            metrics,
            registry: Arc::new(SolverRegistry::new(
                config.default_routing_class,
                config.solver_config(),
            )),
        };
        let metrics_addr = config.metrics_addr;

        let workspace_watcher =
            tokio::spawn(async move { watcher::watch_workspaces(kube_client, reconciler).await });
        let http_server = tokio::spawn(async move { server::serve(metrics_addr, state).await });

        Ok(Self {
            workspace_watcher,
            http_server,
        })
    }

    /// Runs until the watcher or the HTTP server exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("DevWorkspace Controller running");

        tokio::select! {
            result = &mut self.workspace_watcher => {
                result
                    .map_err(|e| {
                        ControllerError::Watch(format!("DevWorkspace watcher panicked: {}", e))
                    })?
                    .map_err(|e| {
                        ControllerError::Watch(format!("DevWorkspace watcher error: {}", e))
                    })?;
                self.http_server.abort();
            }
            result = &mut self.http_server => {
                result
                    .map_err(|e| ControllerError::Watch(format!("HTTP server panicked: {}", e)))??;
                self.workspace_watcher.abort();
            }
        }

        info!("DevWorkspace Controller stopped");
        Ok(())
    }
}
