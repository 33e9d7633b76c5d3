//! Controller-specific error types.
//!
//! Errors returned from a reconciliation pass reach the kube-runtime scheduler, which
//! retries them with backoff. Workspace-level failures (invalid spec, unsupported
//! routing) are not errors: they move the workspace to `Failed` instead.

use cluster_client::ClusterError;
use kube::Error as KubeError;
use routing::SolverError;
use thiserror::Error;

/// Errors that can occur in the DevWorkspace controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error outside the cluster client seam
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cluster object store error
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// Routing solver error
    #[error("Routing error: {0}")]
    Solver(#[from] SolverError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Workspace resource is missing data the controller relies on
    #[error("Invalid workspace: {0}")]
    InvalidWorkspace(String),

    /// Readiness probe could not be built
    #[error("Readiness probe error: {0}")]
    Probe(String),

    /// JSON or YAML (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Resource watch or server task failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// The reconciliation pass panicked
    #[error("Reconciliation panicked: {0}")]
    Panicked(String),
}

impl From<serde_json::Error> for ControllerError {
    fn from(err: serde_json::Error) -> Self {
        ControllerError::Serialization(err.to_string())
    }
}

impl ControllerError {
    /// Optimistic-concurrency conflict on a cluster write
    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Cluster(e) if e.is_conflict())
            || matches!(self, ControllerError::Solver(SolverError::Cluster(e)) if e.is_conflict())
    }
}
