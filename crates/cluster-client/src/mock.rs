//! Mock ClusterClient for unit testing
//!
//! This module provides an in-memory implementation of [`ClusterClient`] that behaves
//! like a minimal API server: resourceVersions are tracked and checked on update,
//! creates of existing objects conflict, merge patches use RFC 7386 semantics and
//! status is preserved across spec updates. Written objects are normalized as the API
//! server would (canonical quantities, no empty env values). Tests can inject
//! conflicts, simulate an unreachable cluster, set object status as another controller
//! would, and inspect every write that was made.

use crate::cluster_trait::ClusterClient;
use crate::convert::{from_dynamic, to_dynamic};
use crate::error::ClusterError;
use crate::kind::ResourceKind;
use crate::normalize::normalize;
use crds::{DevWorkspace, DevWorkspaceStatus};
use kube::ResourceExt;
use kube::api::DynamicObject;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const OBJECT_MODIFIED: &str = "the object has been modified";

type ObjectKey = (ResourceKind, String, String);

/// Kind of write recorded by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockWrite {
    Create,
    Update,
    Patch,
    Delete,
}

/// Mock ClusterClient for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    workspaces: Arc<Mutex<HashMap<(String, String), DevWorkspace>>>,
    objects: Arc<Mutex<BTreeMap<ObjectKey, DynamicObject>>>,
    api_groups: Arc<Mutex<Vec<String>>>,
    pending_conflicts: Arc<Mutex<HashMap<ResourceKind, u32>>>,
    unavailable: Arc<Mutex<bool>>,
    writes: Arc<Mutex<Vec<(MockWrite, ResourceKind, String)>>>,
    status_writes: Arc<Mutex<u32>>,
    // Counter for generating resourceVersions
    next_version: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient").finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn object_key(kind: ResourceKind, namespace: Option<&str>, name: &str) -> ObjectKey {
    let namespace = if kind.is_namespaced() {
        namespace.unwrap_or_default().to_string()
    } else {
        String::new()
    };
    (kind, namespace, name.to_string())
}

fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| match term.split_once('=') {
            Some((key, value)) => labels.get(key.trim()).map(String::as_str) == Some(value.trim()),
            None => labels.contains_key(term),
        })
}

impl MockClusterClient {
    /// Create an empty mock cluster (vanilla Kubernetes: no OpenShift API groups)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty mock cluster that serves the OpenShift route and OAuth API groups
    pub fn openshift() -> Self {
        let client = Self::new();
        client.set_api_groups(&["route.openshift.io", "oauth.openshift.io"]);
        client
    }

    /// Replace the list of served API groups
    pub fn set_api_groups(&self, groups: &[&str]) {
        *lock(&self.api_groups) = groups.iter().map(|g| (*g).to_string()).collect();
    }

    /// Make every call fail as if the API server were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        *lock(&self.unavailable) = unavailable;
    }

    /// Make the next create/update/patch of `kind` fail with a conflict
    pub fn inject_conflict(&self, kind: ResourceKind) {
        *lock(&self.pending_conflicts).entry(kind).or_insert(0) += 1;
    }

    /// Add a workspace to the mock store (for test setup)
    pub fn add_workspace(&self, mut workspace: DevWorkspace) {
        workspace.metadata.resource_version = Some(self.next_version());
        let key = (
            workspace.namespace().unwrap_or_default(),
            workspace.name_any(),
        );
        lock(&self.workspaces).insert(key, workspace);
    }

    /// Current stored copy of a workspace
    pub fn workspace(&self, namespace: &str, name: &str) -> Option<DevWorkspace> {
        lock(&self.workspaces)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Remove a workspace, as if it had been deleted
    pub fn remove_workspace(&self, namespace: &str, name: &str) {
        lock(&self.workspaces).remove(&(namespace.to_string(), name.to_string()));
    }

    /// Number of status subresource writes
    pub fn status_write_count(&self) -> u32 {
        *lock(&self.status_writes)
    }

    /// Add a typed object to the mock store (for test setup; not recorded as a write)
    pub fn add_object<T: Serialize>(
        &self,
        kind: ResourceKind,
        object: &T,
    ) -> Result<(), ClusterError> {
        let mut dynamic = to_dynamic(object)?;
        dynamic.metadata.resource_version = Some(self.next_version());
        let key = object_key(kind, dynamic.metadata.namespace.as_deref(), &dynamic.name_any());
        lock(&self.objects).insert(key, dynamic);
        Ok(())
    }

    /// Stored copy of an object
    pub fn object(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<DynamicObject> {
        lock(&self.objects).get(&object_key(kind, namespace, name)).cloned()
    }

    /// Stored copy of an object, converted to its typed form
    pub fn typed_object<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Option<T> {
        self.object(kind, namespace, name)
            .and_then(|o| from_dynamic(&o).ok())
    }

    /// All stored objects of a kind
    pub fn objects_of_kind(&self, kind: ResourceKind) -> Vec<DynamicObject> {
        lock(&self.objects)
            .iter()
            .filter(|((k, _, _), _)| *k == kind)
            .map(|(_, o)| o.clone())
            .collect()
    }

    /// Set the `status` of a stored object, as the owning platform controller would
    pub fn set_object_status(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        status: serde_json::Value,
    ) -> Result<(), ClusterError> {
        let version = self.next_version();
        let mut objects = lock(&self.objects);
        let object = objects
            .get_mut(&object_key(kind, namespace, name))
            .ok_or_else(|| ClusterError::NotFound(format!("{kind} {name}")))?;
        if let Some(data) = object.data.as_object_mut() {
            data.insert("status".to_string(), status);
        }
        object.metadata.resource_version = Some(version);
        Ok(())
    }

    /// Every object write made through the trait, in order
    pub fn writes(&self) -> Vec<(MockWrite, ResourceKind, String)> {
        lock(&self.writes).clone()
    }

    /// Number of object writes made through the trait
    pub fn write_count(&self) -> usize {
        lock(&self.writes).len()
    }

    /// Forget recorded writes
    pub fn clear_writes(&self) {
        lock(&self.writes).clear();
        *lock(&self.status_writes) = 0;
    }

    fn next_version(&self) -> String {
        let mut version = lock(&self.next_version);
        *version += 1;
        version.to_string()
    }

    fn check_available(&self) -> Result<(), ClusterError> {
        if *lock(&self.unavailable) {
            return Err(ClusterError::Unavailable("mock cluster is unavailable".to_string()));
        }
        Ok(())
    }

    fn take_conflict(&self, kind: ResourceKind, name: &str) -> Result<(), ClusterError> {
        let mut pending = lock(&self.pending_conflicts);
        if let Some(count) = pending.get_mut(&kind) {
            if *count > 0 {
                *count -= 1;
                return Err(ClusterError::Conflict(format!(
                    "Operation cannot be fulfilled on {kind} \"{name}\": {OBJECT_MODIFIED}"
                )));
            }
        }
        Ok(())
    }

    fn record(&self, write: MockWrite, kind: ResourceKind, name: &str) {
        lock(&self.writes).push((write, kind, name.to_string()));
    }
}

#[async_trait::async_trait]
impl ClusterClient for MockClusterClient {
    async fn get_workspace(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DevWorkspace>, ClusterError> {
        self.check_available()?;
        Ok(self.workspace(namespace, name))
    }

    async fn replace_workspace(
        &self,
        workspace: &DevWorkspace,
    ) -> Result<DevWorkspace, ClusterError> {
        self.check_available()?;
        let key = (workspace.namespace().unwrap_or_default(), workspace.name_any());
        let version = self.next_version();
        let mut workspaces = lock(&self.workspaces);
        let stored = workspaces
            .get_mut(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("DevWorkspace {}", key.1)))?;
        if workspace.metadata.resource_version.is_some()
            && workspace.metadata.resource_version != stored.metadata.resource_version
        {
            return Err(ClusterError::Conflict(format!(
                "Operation cannot be fulfilled on DevWorkspace \"{}\": {OBJECT_MODIFIED}",
                key.1
            )));
        }
        let status = stored.status.take();
        *stored = workspace.clone();
        stored.status = status;
        stored.metadata.resource_version = Some(version);
        Ok(stored.clone())
    }

    async fn patch_workspace_status(
        &self,
        namespace: &str,
        name: &str,
        status: &DevWorkspaceStatus,
    ) -> Result<(), ClusterError> {
        self.check_available()?;
        let version = self.next_version();
        let mut workspaces = lock(&self.workspaces);
        let stored = workspaces
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| ClusterError::NotFound(format!("DevWorkspace {name}")))?;
        stored.status = Some(status.clone());
        stored.metadata.resource_version = Some(version);
        *lock(&self.status_writes) += 1;
        Ok(())
    }

    async fn get_object(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>, ClusterError> {
        self.check_available()?;
        Ok(self.object(kind, namespace, name))
    }

    async fn list_objects(
        &self,
        kind: ResourceKind,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>, ClusterError> {
        self.check_available()?;
        Ok(lock(&self.objects)
            .iter()
            .filter(|((k, ns, _), _)| *k == kind && (!kind.is_namespaced() || ns == namespace))
            .filter(|(_, o)| selector_matches(label_selector, o.labels()))
            .map(|(_, o)| o.clone())
            .collect())
    }

    async fn create_object(
        &self,
        kind: ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        self.check_available()?;
        let name = object.name_any();
        self.take_conflict(kind, &name)?;
        let key = object_key(kind, object.metadata.namespace.as_deref(), &name);
        let version = self.next_version();
        let mut objects = lock(&self.objects);
        if objects.contains_key(&key) {
            return Err(ClusterError::Conflict(format!("{kind} \"{name}\" already exists")));
        }
        let mut created = object.clone();
        created.metadata.resource_version = Some(version);
        created.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        if let Some(data) = created.data.as_object_mut() {
            data.remove("status");
        }
        normalize(&mut created.data);
        objects.insert(key, created.clone());
        drop(objects);
        self.record(MockWrite::Create, kind, &name);
        Ok(created)
    }

    async fn update_object(
        &self,
        kind: ResourceKind,
        object: &DynamicObject,
    ) -> Result<DynamicObject, ClusterError> {
        self.check_available()?;
        let name = object.name_any();
        self.take_conflict(kind, &name)?;
        let key = object_key(kind, object.metadata.namespace.as_deref(), &name);
        let version = self.next_version();
        let mut objects = lock(&self.objects);
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("{kind} {name}")))?;
        if object.metadata.resource_version.is_some()
            && object.metadata.resource_version != stored.metadata.resource_version
        {
            return Err(ClusterError::Conflict(format!(
                "Operation cannot be fulfilled on {kind} \"{name}\": {OBJECT_MODIFIED}"
            )));
        }
        let status = stored.data.get("status").cloned();
        let uid = stored.metadata.uid.clone();
        let mut updated = object.clone();
        updated.metadata.resource_version = Some(version);
        updated.metadata.uid = uid;
        normalize(&mut updated.data);
        if let (Some(status), Some(data)) = (status, updated.data.as_object_mut()) {
            data.insert("status".to_string(), status);
        }
        *stored = updated.clone();
        drop(objects);
        self.record(MockWrite::Update, kind, &name);
        Ok(updated)
    }

    async fn patch_object(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<DynamicObject, ClusterError> {
        self.check_available()?;
        self.take_conflict(kind, name)?;
        let key = object_key(kind, namespace, name);
        let version = self.next_version();
        let mut objects = lock(&self.objects);
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| ClusterError::NotFound(format!("{kind} {name}")))?;
        let mut document = serde_json::to_value(&*stored)?;
        json_patch::merge(&mut document, patch);
        normalize(&mut document);
        let mut patched: DynamicObject = serde_json::from_value(document)?;
        patched.metadata.resource_version = Some(version);
        *stored = patched.clone();
        drop(objects);
        self.record(MockWrite::Patch, kind, name);
        Ok(patched)
    }

    async fn delete_object(
        &self,
        kind: ResourceKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<(), ClusterError> {
        self.check_available()?;
        let removed = lock(&self.objects).remove(&object_key(kind, namespace, name));
        if removed.is_some() {
            self.record(MockWrite::Delete, kind, name);
        }
        Ok(())
    }

    async fn api_group_available(&self, group: &str) -> Result<bool, ClusterError> {
        self.check_available()?;
        Ok(lock(&self.api_groups).iter().any(|g| g == group))
    }
}
