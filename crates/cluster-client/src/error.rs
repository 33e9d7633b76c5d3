//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster object store
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Transport or client-side error from kube
    #[error("Kubernetes error: {0}")]
    Kube(#[source] kube::Error),

    /// API server rejected the request
    #[error("Kubernetes API error ({code}): {message}")]
    Api { code: u16, message: String },

    /// Optimistic concurrency failure or create of an existing object (HTTP 409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Object does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cluster could not be reached
    #[error("Cluster unavailable: {0}")]
    Unavailable(String),
}

impl ClusterError {
    /// A concurrent modification; the caller should recompute and retry
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClusterError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }
}

impl From<kube::Error> for ClusterError {
    fn from(error: kube::Error) -> Self {
        match error {
            kube::Error::Api(ae) if ae.code == 409 => ClusterError::Conflict(ae.message),
            kube::Error::Api(ae) if ae.code == 404 => ClusterError::NotFound(ae.message),
            kube::Error::Api(ae) => ClusterError::Api {
                code: ae.code,
                message: ae.message,
            },
            other => ClusterError::Kube(other),
        }
    }
}
