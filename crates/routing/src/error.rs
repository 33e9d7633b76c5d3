//! Routing solver errors

use cluster_client::ClusterError;
use thiserror::Error;

/// Errors returned by routing solvers and the solver registry
#[derive(Debug, Error)]
pub enum SolverError {
    /// Routing class is not one of the supported classes
    #[error("routing class {0:?} is not supported")]
    RoutingNotSupported(String),

    /// Routing class is supported but needs platform features this cluster lacks
    #[error("routing class {0:?} requires OpenShift and cannot be used on this cluster")]
    PlatformMismatch(String),

    /// An endpoint cannot be exposed as declared
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A live object the solver depends on is missing or incomplete
    #[error("missing object: {0}")]
    MissingObject(String),

    /// Cluster access failed during finalization
    #[error("cluster error: {0}")]
    Cluster(#[from] ClusterError),
}
