//! Create-or-update of a single cluster object.
//!
//! The desired object is normalized the way the API server stores it and then compared
//! as a subset of the live one, so fields defaulted, filled in or rewritten by the API
//! server never count as drift.

use crate::error::ControllerError;
use cluster_client::{
    ClusterClient, ClusterError, ResourceKind, from_dynamic, normalize, to_dynamic,
};
use crds::DevWorkspace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use kube::api::DynamicObject;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

/// What `sync_object` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Created,
    Updated,
    Unchanged,
}

/// Controller owner reference pointing at the workspace
pub fn owner_reference(workspace: &DevWorkspace) -> Result<OwnerReference, ControllerError> {
    workspace.controller_owner_ref(&()).ok_or_else(|| {
        ControllerError::InvalidWorkspace(format!(
            "DevWorkspace {} has no name or uid",
            workspace.metadata.name.as_deref().unwrap_or_default()
        ))
    })
}

/// `desired` is contained in `live`.
///
/// Objects match key by key; arrays must have the same length and match element-wise.
/// A desired null or empty collection matches an absent live field.
pub fn is_subset(desired: &Value, live: &Value) -> bool {
    match (desired, live) {
        (Value::Object(d), Value::Object(l)) => d.iter().all(|(key, value)| match l.get(key) {
            Some(live_value) => is_subset(value, live_value),
            None => is_empty_value(value),
        }),
        (Value::Array(d), Value::Array(l)) => {
            d.len() == l.len() && d.iter().zip(l).all(|(d, l)| is_subset(d, l))
        }
        (d, Value::Null) => is_empty_value(d),
        (d, l) => d == l,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// Ensure `desired` exists and matches; returns the live object and what was done.
///
/// Conflicts surface as `ClusterError::Conflict` for the caller to requeue.
pub async fn sync_object(
    client: &dyn ClusterClient,
    kind: ResourceKind,
    desired: &DynamicObject,
) -> Result<(DynamicObject, SyncAction), ClusterError> {
    let name = desired.metadata.name.clone().unwrap_or_default();
    let namespace = desired.metadata.namespace.as_deref();

    let Some(live) = client.get_object(kind, namespace, &name).await? else {
        let created = client.create_object(kind, desired).await?;
        info!("Created {} {}", kind, name);
        return Ok((created, SyncAction::Created));
    };

    let mut desired_value = serde_json::to_value(desired)?;
    normalize(&mut desired_value);
    let mut merged = serde_json::to_value(&live)?;
    if is_subset(&desired_value, &merged) {
        debug!("{} {} is up to date", kind, name);
        return Ok((live, SyncAction::Unchanged));
    }

    json_patch::merge(&mut merged, &desired_value);
    let mut update: DynamicObject = serde_json::from_value(merged)?;
    update.metadata.resource_version = live.metadata.resource_version.clone();
    let updated = client.update_object(kind, &update).await?;
    info!("Updated {} {}", kind, name);
    Ok((updated, SyncAction::Updated))
}

/// Create `desired` unless an object of that name exists; an existing object is never
/// updated. Returns the live object and whether it was created.
pub async fn create_if_absent_typed<T>(
    client: &dyn ClusterClient,
    kind: ResourceKind,
    desired: &T,
) -> Result<(T, SyncAction), ClusterError>
where
    T: Serialize + DeserializeOwned,
{
    let desired = to_dynamic(desired)?;
    let name = desired.metadata.name.clone().unwrap_or_default();
    let namespace = desired.metadata.namespace.as_deref();

    if let Some(live) = client.get_object(kind, namespace, &name).await? {
        return Ok((from_dynamic(&live)?, SyncAction::Unchanged));
    }
    let created = client.create_object(kind, &desired).await?;
    info!("Created {} {}", kind, name);
    Ok((from_dynamic(&created)?, SyncAction::Created))
}

/// Typed wrapper around [`sync_object`]
pub async fn sync_typed<T>(
    client: &dyn ClusterClient,
    kind: ResourceKind,
    desired: &T,
) -> Result<(T, SyncAction), ClusterError>
where
    T: Serialize + DeserializeOwned,
{
    let (live, action) = sync_object(client, kind, &to_dynamic(desired)?).await?;
    Ok((from_dynamic(&live)?, action))
}
