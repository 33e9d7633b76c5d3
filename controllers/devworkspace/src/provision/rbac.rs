//! Access control shared by the workspaces of a namespace.

use super::ProvisioningStatus;
use super::sync::sync_typed;
use cluster_client::{ClusterClient, ResourceKind};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject};
use kube::api::ObjectMeta;
use routing::naming::{EXEC_ROLE_BINDING_NAME, VIEW_ROLE_BINDING_NAME, WORKSPACE_ROLE_NAME};

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        ..Default::default()
    }
}

/// Every service account in the namespace
fn service_accounts_group(namespace: &str) -> Subject {
    Subject {
        kind: "Group".to_string(),
        name: format!("system:serviceaccounts:{namespace}"),
        api_group: Some(RBAC_API_GROUP.to_string()),
        namespace: None,
    }
}

pub fn workspace_role(namespace: &str) -> Role {
    Role {
        metadata: meta(WORKSPACE_ROLE_NAME, namespace),
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec![String::new()]),
            resources: Some(vec!["pods/exec".to_string()]),
            verbs: vec!["create".to_string()],
            ..Default::default()
        }]),
    }
}

fn binding(name: &str, namespace: &str, role_kind: &str, role_name: &str) -> RoleBinding {
    RoleBinding {
        metadata: meta(name, namespace),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: role_kind.to_string(),
            name: role_name.to_string(),
        },
        subjects: Some(vec![service_accounts_group(namespace)]),
    }
}

/// Binding of the `view` cluster role
pub fn view_role_binding(namespace: &str) -> RoleBinding {
    binding(VIEW_ROLE_BINDING_NAME, namespace, "ClusterRole", "view")
}

/// Binding of the exec role
pub fn exec_role_binding(namespace: &str) -> RoleBinding {
    binding(EXEC_ROLE_BINDING_NAME, namespace, "Role", WORKSPACE_ROLE_NAME)
}

/// Ensure the namespace role and bindings. Shared by all workspaces, so no owner reference.
pub async fn sync_rbac(client: &dyn ClusterClient, namespace: &str) -> ProvisioningStatus<()> {
    sync_typed(client, ResourceKind::Role, &workspace_role(namespace)).await?;
    sync_typed(client, ResourceKind::RoleBinding, &view_role_binding(namespace)).await?;
    sync_typed(client, ResourceKind::RoleBinding, &exec_role_binding(namespace)).await?;
    Ok(())
}
