//! Identity materialization: the workspace service account.

use super::ProvisioningStatus;
use super::sync::{owner_reference, sync_typed};
use cluster_client::{ClusterClient, ResourceKind};
use crds::DevWorkspace;
use k8s_openapi::api::core::v1::ServiceAccount;
use kube::api::ObjectMeta;
use routing::{WorkspaceMetadata, naming};
use std::collections::BTreeMap;

/// Ensure `<id>-sa` exists with the annotations contributed by routing.
///
/// Returns the service account name for the deployment.
pub async fn sync_service_account(
    client: &dyn ClusterClient,
    workspace: &DevWorkspace,
    meta: &WorkspaceMetadata,
    annotations: &BTreeMap<String, String>,
) -> ProvisioningStatus<String> {
    let name = naming::service_account_name(&meta.workspace_id);
    let service_account = ServiceAccount {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(meta.namespace.clone()),
            labels: Some(meta.labels()),
            annotations: (!annotations.is_empty()).then(|| annotations.clone()),
            owner_references: Some(vec![owner_reference(workspace)?]),
            ..Default::default()
        },
        ..Default::default()
    };
    sync_typed(client, ResourceKind::ServiceAccount, &service_account).await?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_workspace, workspace_meta};
    use cluster_client::MockClusterClient;

    #[tokio::test]
    async fn test_annotations_from_routing_are_applied() {
        let client = MockClusterClient::new();
        let workspace = test_workspace("ws", "dev");
        let meta = workspace_meta(&workspace);

        let name = sync_service_account(&client, &workspace, &meta, &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(name, format!("{}-sa", meta.workspace_id));

        let annotations = BTreeMap::from([(
            "serviceaccounts.openshift.io/oauth-redirectreference.web".to_string(),
            "{}".to_string(),
        )]);
        sync_service_account(&client, &workspace, &meta, &annotations).await.unwrap();

        let stored: ServiceAccount = client
            .typed_object(ResourceKind::ServiceAccount, Some("dev"), &name)
            .unwrap();
        assert_eq!(stored.metadata.annotations.unwrap(), annotations);
        assert_eq!(client.write_count(), 2);
    }
}
