//! Provisioning steps.
//!
//! Every step converges one slice of cluster state toward the desired object set and
//! is safe to re-run from scratch on every pass. A step either completes (`Ok`) and
//! lets dependents proceed, or reports why it is [`Blocked`]:
//!
//! - `Requeue`: expected to resolve on its own (object not ready, write conflict)
//! - `FailStartup`: will not resolve without a spec change; the workspace fails
//! - `Error`: infrastructure failure handed to the scheduler's backoff

pub mod components;
pub mod deployment;
pub mod rbac;
pub mod routing;
pub mod service_account;
pub mod storage;
pub mod sync;


use crate::error::ControllerError;
use cluster_client::ClusterError;
use ::routing::SolverError;

/// Why a provisioning step did not complete
#[derive(Debug)]
pub enum Blocked {
    Requeue(String),
    FailStartup(String),
    Error(ControllerError),
}

/// Outcome of a provisioning step
pub type ProvisioningStatus<T> = Result<T, Blocked>;

impl Blocked {
    pub fn requeue(message: impl Into<String>) -> Self {
        Blocked::Requeue(message.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Blocked::FailStartup(message.into())
    }
}

/// Write conflicts are benign: the next pass recomputes against the latest version.
impl From<ClusterError> for Blocked {
    fn from(err: ClusterError) -> Self {
        if err.is_conflict() {
            Blocked::Requeue(format!("conflict while syncing objects: {err}"))
        } else {
            Blocked::Error(ControllerError::Cluster(err))
        }
    }
}

impl From<ControllerError> for Blocked {
    fn from(err: ControllerError) -> Self {
        if err.is_conflict() {
            Blocked::Requeue(format!("conflict while syncing objects: {err}"))
        } else {
            Blocked::Error(err)
        }
    }
}

impl From<SolverError> for Blocked {
    fn from(err: SolverError) -> Self {
        match err {
            SolverError::Cluster(e) => e.into(),
            other => Blocked::Error(ControllerError::Solver(other)),
        }
    }
}
