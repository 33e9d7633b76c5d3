//! kube-rs backed implementation of [`ClusterClient`].

use crate::cluster_trait::{ClusterClient, status_patch};
use crate::error::ClusterError;
use crate::kind::ResourceKind;
use crds::{DevWorkspace, DevWorkspaceStatus};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

/// Cluster client talking to the API server through kube-rs
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Wrap an existing kube client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Underlying kube client, for watchers
    pub fn kube_client(&self) -> Client {
        self.client.clone()
    }

    fn dynamic_api(&self, kind: ResourceKind, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = kind.api_resource();
        match namespace {
            Some(ns) if kind.is_namespaced() => {
                Api::namespaced_with(self.client.clone(), ns, &resource)
            }
            _ => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn workspace_api(&self, namespace: &str) -> Api<DevWorkspace> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    async fn get_workspace(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DevWorkspace>, ClusterError> {
        Ok(self.workspace_api(namespace).get_opt(name).await?)
    }

    async fn replace_workspace(
        &self,
        workspace: &DevWorkspace,
    ) -> Result<DevWorkspace, ClusterError> {
        let namespace = workspace
            .namespace()
            .ok_or_else(|| ClusterError::Api {
                code: 400,
                message: "DevWorkspace has no namespace".to_string(),
            })?;
        let name = workspace.name_any();
        Ok(self
            .workspace_api(&namespace)
            .replace(&name, &PostParams::default(), workspace)
            .await?)
    }

    async fn patch_workspace_status(
        &self,
        namespace: &str,
        name: &str,
        status: &DevWorkspaceStatus,
    ) -> Result<(), ClusterError> {
        let patch = status_patch(status);
        self.workspace_api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_object(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError> {
        Ok(self.dynamic_api(kind, namespace).get_opt(name).await?)
    }

    async fn list_objects(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        let params = ListParams::default().labels(label_selector);
        let list = self.dynamic_api(kind, Some(namespace)).list(&params).await?;
        Ok(list.items)
    }

    async fn create_object(
        &self,
        kind: ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        debug!("Creating {} {}", kind, object.name_any());
        Ok(self
            .dynamic_api(kind, object.metadata.namespace.as_deref())
            .create(&PostParams::default(), object)
            .await?)
    }

    async fn update_object(
        &self,
        kind: ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        let name = object.name_any();
        debug!("Updating {} {}", kind, name);
        Ok(self
            .dynamic_api(kind, object.metadata.namespace.as_deref())
            .replace(&name, &PostParams::default(), object)
            .await?)
    }

    async fn patch_object(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject, ClusterError> {
        debug!("Patching {} {}", kind, name);
        Ok(self
            .dynamic_api(kind, namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await?)
    }

    async fn delete_object(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        debug!("Deleting {} {}", kind, name);
        match self
            .dynamic_api(kind, namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(ClusterError::from)
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn api_group_available(&self, group: &str) -> Result<bool, ClusterError> {
        let groups = self.client.list_api_groups().await?;
        Ok(groups.groups.iter().any(|g| g.name == group))
    }
}
