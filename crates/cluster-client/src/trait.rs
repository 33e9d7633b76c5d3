//! ClusterClient trait for mocking
//!
//! This trait abstracts the cluster object store to enable mocking in unit tests.
//! `KubeClusterClient` implements it against a live API server; tests use `MockClusterClient`.

use crate::error::ClusterError;
use crate::kind::ResourceKind;
use crds::{DevWorkspace, DevWorkspaceStatus};
use kube::api::DynamicObject;

/// Trait for cluster object store operations
///
/// All methods must be `Send` to work with Tokio's work-stealing runtime.
/// `get_*` methods return `Ok(None)` for absent objects rather than an error.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    // DevWorkspace Operations
    async fn get_workspace(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DevWorkspace>, ClusterError>;
    /// Replace the workspace object (metadata and spec), using its resourceVersion for
    /// concurrency control
    async fn replace_workspace(
        &self,
        workspace: &DevWorkspace,
    ) -> Result<DevWorkspace, ClusterError>;
    /// Write the status subresource in full; absent optional fields are cleared
    async fn patch_workspace_status(
        &self,
        namespace: &str,
        name: &str,
        status: &DevWorkspaceStatus,
    ) -> Result<(), ClusterError>;

    // Owned object Operations
    async fn get_object(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError>;
    async fn list_objects(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError>;
    async fn create_object(
        &self,
        kind: ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;
    /// Replace an existing object; the object's resourceVersion must match the live one
    async fn update_object(
        &self,
        kind: ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError>;
    /// Apply a JSON merge patch
    async fn patch_object(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject, ClusterError>;
    /// Delete an object; deleting an absent object succeeds
    async fn delete_object(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError>;

    // Discovery
    async fn api_group_available(&self, group: &str) -> Result<bool, ClusterError>;
}

/// Full status body for a merge patch; `null` clears fields that are unset
pub(crate) fn status_patch(status: &DevWorkspaceStatus) -> serde_json::Value {
    serde_json::json!({
        "status": {
            "workspaceId": status.workspace_id,
            "phase": status.phase,
            "conditions": status.conditions,
            "mainUrl": status.main_url,
            "message": status.message,
        }
    })
}
