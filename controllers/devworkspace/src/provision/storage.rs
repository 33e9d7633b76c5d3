//! Persistent storage: the claim shared by every workspace in a namespace.

use super::sync::{SyncAction, create_if_absent_typed};
use super::{Blocked, ProvisioningStatus};
use crate::config::ControllerConfig;
use cluster_client::{ClusterClient, ResourceKind};
use crds::ComponentDescription;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use routing::naming::COMMON_PVC_NAME;
use std::collections::BTreeMap;
use tracing::debug;

/// Pod volume backed by the shared claim
pub const STORAGE_VOLUME_NAME: &str = COMMON_PVC_NAME;

pub fn needs_storage(components: &[ComponentDescription]) -> bool {
    components.iter().any(|c| c.needs_storage)
}

/// Desired shared claim. Carries no owner reference: other workspaces mount it too.
pub fn common_pvc(namespace: &str, config: &ControllerConfig) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(COMMON_PVC_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(config.pvc_size.clone()),
                )])),
                ..Default::default()
            }),
            storage_class_name: config.pvc_storage_class.clone(),
            ..Default::default()
        }),
        status: None,
    }
}

/// Ensure the shared claim exists when any component needs storage.
///
/// Create-only: a bound claim's spec is immutable, so an existing claim is never updated.
pub async fn sync_storage(
    client: &dyn ClusterClient,
    namespace: &str,
    components: &[ComponentDescription],
    config: &ControllerConfig,
) -> ProvisioningStatus<()> {
    if !needs_storage(components) {
        debug!("No component in {} needs storage", namespace);
        return Ok(());
    }

    let desired = common_pvc(namespace, config);
    let (pvc, action) =
        create_if_absent_typed(client, ResourceKind::PersistentVolumeClaim, &desired).await?;
    if action == SyncAction::Created {
        return Ok(());
    }

    let phase = pvc.status.and_then(|s| s.phase);
    if phase.as_deref() == Some("Lost") {
        return Err(Blocked::fail(format!(
            "PersistentVolumeClaim {COMMON_PVC_NAME} lost its underlying volume"
        )));
    }
    Ok(())
}
