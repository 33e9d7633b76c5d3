//! Workload materialization: assemble the workspace pod and sync its deployment.

use super::storage::STORAGE_VOLUME_NAME;
use super::sync::{owner_reference, sync_typed};
use super::{Blocked, ProvisioningStatus};
use cluster_client::{ClusterClient, ResourceKind, from_dynamic};
use crds::{ComponentDescription, DevWorkspace, PodAdditions};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerStatus, PersistentVolumeClaimVolumeSource, Pod, PodSpec, PodTemplateSpec,
    Volume,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ObjectMeta;
use routing::{WorkspaceMetadata, naming};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Container waiting reasons that will not clear without a spec change
const FATAL_WAITING_REASONS: [&str; 3] = ["CrashLoopBackOff", "ImagePullBackOff", "ErrImagePull"];

fn check_unique<'a>(kind: &str, names: impl Iterator<Item = &'a str>) -> ProvisioningStatus<()> {
    let mut seen = BTreeSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(Blocked::fail(format!(
                "DevWorkspace spec is invalid: duplicate {kind} name {name:?}"
            )));
        }
    }
    Ok(())
}

/// Merge component and routing contributions into one pod spec.
///
/// Component volume mounts go to every component container; routing sidecars keep their
/// own mounts. Duplicate container or volume names fail startup.
pub fn merge_pod_additions(
    components: &[ComponentDescription],
    routing: Option<&PodAdditions>,
    needs_storage: bool,
) -> ProvisioningStatus<PodSpec> {
    let component_additions = components.iter().map(|c| &c.pod_additions);
    let all_additions: Vec<&PodAdditions> = component_additions.clone().chain(routing).collect();

    let shared_mounts: Vec<_> = all_additions
        .iter()
        .flat_map(|a| a.volume_mounts.iter().cloned())
        .collect();

    let mut containers: Vec<Container> = component_additions
        .flat_map(|a| a.containers.iter().cloned())
        .map(|mut container| {
            if !shared_mounts.is_empty() {
                container
                    .volume_mounts
                    .get_or_insert_with(Vec::new)
                    .extend(shared_mounts.iter().cloned());
            }
            container
        })
        .collect();
    if let Some(routing) = routing {
        containers.extend(routing.containers.iter().cloned());
    }

    let init_containers: Vec<Container> = all_additions
        .iter()
        .flat_map(|a| a.init_containers.iter().cloned())
        .collect();

    let mut volumes: Vec<Volume> = all_additions
        .iter()
        .flat_map(|a| a.volumes.iter().cloned())
        .collect();
    if needs_storage {
        volumes.push(Volume {
            name: STORAGE_VOLUME_NAME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: naming::COMMON_PVC_NAME.to_string(),
                read_only: None,
            }),
            ..Default::default()
        });
    }

    check_unique(
        "container",
        containers.iter().chain(&init_containers).map(|c| c.name.as_str()),
    )?;
    check_unique("volume", volumes.iter().map(|v| v.name.as_str()))?;

    Ok(PodSpec {
        containers,
        init_containers: (!init_containers.is_empty()).then_some(init_containers),
        volumes: (!volumes.is_empty()).then_some(volumes),
        ..Default::default()
    })
}

/// Desired workspace deployment
pub fn workspace_deployment(
    workspace: &DevWorkspace,
    meta: &WorkspaceMetadata,
    mut pod_spec: PodSpec,
    service_account: &str,
) -> ProvisioningStatus<Deployment> {
    pod_spec.service_account_name = Some(service_account.to_string());
    Ok(Deployment {
        metadata: ObjectMeta {
            name: Some(naming::deployment_name(&meta.workspace_id)),
            namespace: Some(meta.namespace.clone()),
            labels: Some(meta.labels()),
            owner_references: Some(vec![owner_reference(workspace)?]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(meta.pod_selector.clone()),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                rolling_update: None,
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(naming::deployment_name(&meta.workspace_id)),
                    labels: Some(meta.labels()),
                    ..Default::default()
                }),
                spec: Some(pod_spec),
            },
            ..Default::default()
        }),
        status: None,
    })
}

fn fatal_reason(statuses: Option<&Vec<ContainerStatus>>) -> Option<(String, String)> {
    statuses?.iter().find_map(|status| {
        let reason = status.state.as_ref()?.waiting.as_ref()?.reason.as_deref()?;
        FATAL_WAITING_REASONS
            .contains(&reason)
            .then(|| (status.name.clone(), reason.to_string()))
    })
}

/// Look for workspace pods stuck in a state that needs a spec change
async fn check_pods(
    client: &dyn ClusterClient,
    meta: &WorkspaceMetadata,
) -> ProvisioningStatus<()> {
    let pods = client
        .list_objects(ResourceKind::Pod, &meta.namespace, &meta.label_selector())
        .await?;
    for object in pods {
        let pod: Pod = from_dynamic(&object)?;
        let Some(status) = pod.status.as_ref() else {
            continue;
        };
        let stuck = fatal_reason(status.init_container_statuses.as_ref())
            .or_else(|| fatal_reason(status.container_statuses.as_ref()));
        if let Some((container, reason)) = stuck {
            warn!("Workspace {} container {} is in {}", meta.workspace_id, container, reason);
            return Err(Blocked::fail(format!("Container {container} has state {reason}")));
        }
    }
    Ok(())
}

/// Sync the workspace deployment and wait for an available replica.
pub async fn sync_deployment(
    client: &dyn ClusterClient,
    workspace: &DevWorkspace,
    meta: &WorkspaceMetadata,
    pod_spec: PodSpec,
    service_account: &str,
) -> ProvisioningStatus<()> {
    let desired = workspace_deployment(workspace, meta, pod_spec, service_account)?;
    let (live, _) = sync_typed(client, ResourceKind::Deployment, &desired).await?;

    let available = live
        .status
        .as_ref()
        .and_then(|s| s.available_replicas)
        .unwrap_or(0);
    if available >= 1 {
        debug!("Deployment {} is available", meta.workspace_id);
        return Ok(());
    }

    check_pods(client, meta).await?;
    Err(Blocked::requeue("Waiting for workspace deployment to become available"))
}
