//! Deletion: solver cleanup guarded by the routing finalizer.

use super::ReconcileOutcome;
use crate::error::ControllerError;
use cluster_client::ClusterClient;
use crds::{DevWorkspace, ROUTING_FINALIZER};
use kube::ResourceExt;
use routing::{SolverRegistry, WorkspaceMetadata};
use tracing::{debug, info, warn};

/// Run solver cleanup for a workspace being deleted, then release the finalizer.
///
/// Owned objects are garbage collected through owner references; only what the solver
/// created outside that model (the cluster-scoped OAuth client) needs work here.
pub async fn finalize_workspace(
    client: &dyn ClusterClient,
    registry: &SolverRegistry,
    routing_suffix: Option<String>,
    workspace: &DevWorkspace,
) -> Result<ReconcileOutcome, ControllerError> {
    if !workspace.finalizers().iter().any(|f| f == ROUTING_FINALIZER) {
        debug!("DevWorkspace {} is being deleted", workspace.name_any());
        return Ok(ReconcileOutcome::Done);
    }

    match (registry.get_solver(workspace.routing_class()), workspace.workspace_id()) {
        (Ok(solver), Some(workspace_id)) => {
            let meta = WorkspaceMetadata::new(
                workspace_id,
                workspace.namespace().unwrap_or_default(),
                routing_suffix,
            );
            solver.finalize(client, &meta).await?;
        }
        (Err(e), _) => warn!(
            "Cannot finalize routing for DevWorkspace {}: {}; removing finalizer",
            workspace.name_any(),
            e
        ),
        (_, None) => debug!("DevWorkspace {} was never provisioned", workspace.name_any()),
    }

    let mut updated = workspace.clone();
    updated.finalizers_mut().retain(|f| f != ROUTING_FINALIZER);
    match client.replace_workspace(&updated).await {
        Ok(_) => {
            info!("Removed routing finalizer from DevWorkspace {}", workspace.name_any());
            Ok(ReconcileOutcome::Done)
        }
        Err(e) if e.is_conflict() => Ok(ReconcileOutcome::RequeueNow),
        Err(e) => Err(e.into()),
    }
}
