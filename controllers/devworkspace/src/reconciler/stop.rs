//! Stop sub-machine: scale the workspace deployment to zero and wait for it to drain.

use cluster_client::{ClusterClient, ClusterError, ResourceKind, from_dynamic};
use crds::WorkspacePhase;
use k8s_openapi::api::apps::v1::Deployment;
use routing::naming;
use serde_json::json;
use tracing::{debug, info};

/// Drive the workspace deployment toward zero replicas.
///
/// Returns `Stopped` once no deployment exists or its replicas have drained, and
/// `Stopping` while a scale-down is pending. A conflicting write is a benign race: the
/// next pass observes the latest version.
pub async fn stop_workspace(
    client: &dyn ClusterClient,
    namespace: &str,
    workspace_id: &str,
) -> Result<WorkspacePhase, ClusterError> {
    let name = naming::deployment_name(workspace_id);
    let Some(live) = client
        .get_object(ResourceKind::Deployment, Some(namespace), &name)
        .await?
    else {
        debug!("No deployment for stopped workspace {}", workspace_id);
        return Ok(WorkspacePhase::Stopped);
    };

    let deployment: Deployment = from_dynamic(&live)?;
    let desired = deployment.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
    if desired > 0 {
        let patch = json!({"spec": {"replicas": 0}});
        match client
            .patch_object(ResourceKind::Deployment, Some(namespace), &name, &patch)
            .await
        {
            Ok(_) => info!("Scaled deployment {}/{} to zero", namespace, name),
            Err(e) if e.is_conflict() => {
                debug!("Conflict scaling {}/{} down, retrying next pass", namespace, name)
            }
            Err(e) => return Err(e),
        }
        return Ok(WorkspacePhase::Stopping);
    }

    let observed = deployment.status.as_ref().and_then(|s| s.replicas).unwrap_or(0);
    if observed > 0 {
        debug!("Deployment {}/{} still has {} replicas", namespace, name, observed);
        return Ok(WorkspacePhase::Stopping);
    }
    Ok(WorkspacePhase::Stopped)
}
