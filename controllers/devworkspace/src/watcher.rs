//! Kubernetes resource watcher.
//!
//! Drives the reconciler from a `kube_runtime::Controller` over DevWorkspaces. Changes
//! to owned objects (deployment, services, ingresses, routes, service account) map back
//! to their workspace through owner references. The shared PVC has no owner and is not
//! watched.

use crate::error::ControllerError;
use crate::reconciler::Reconciler;
use crds::{DevWorkspace, WORKSPACE_ID_LABEL};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Service, ServiceAccount};
use k8s_openapi::api::networking::v1::Ingress;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{Controller, watcher};
use routing::Route;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Waits this long after the last event before reconciling, batching bursts of
/// owned-object updates into one pass
const DEBOUNCE: Duration = Duration::from_secs(1);

/// Bounded worker pool; the controller never runs two passes for one workspace at once
const CONCURRENCY: u16 = 8;

fn resource_key(workspace: &DevWorkspace) -> String {
    format!("{}/{}", workspace.namespace().unwrap_or_default(), workspace.name_any())
}

async fn reconcile(
    workspace: Arc<DevWorkspace>,
    reconciler: Arc<Reconciler>,
) -> Result<Action, ControllerError> {
    let namespace = workspace.namespace().unwrap_or_default();
    let name = workspace.name_any();
    debug!("Reconcile triggered for DevWorkspace {}/{}", namespace, name);

    let outcome = reconciler.reconcile_workspace(&namespace, &name).await?;
    reconciler.reset_error(&resource_key(&workspace));
    Ok(outcome.to_action(reconciler.config.requeue_interval))
}

/// Requeue with Fibonacci backoff on errors
fn error_policy(
    workspace: Arc<DevWorkspace>,
    error: &ControllerError,
    reconciler: Arc<Reconciler>,
) -> Action {
    let key = resource_key(&workspace);
    reconciler.increment_error(&key);
    let (backoff, error_count) = reconciler.get_backoff_for_resource(&key);
    error!(
        "Reconciliation error for DevWorkspace {} (attempt {}), retrying in {:?}: {}",
        key, error_count, backoff, error
    );
    Action::requeue(backoff)
}

/// Namespaced API when a watch namespace is configured, cluster-wide otherwise
fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// Watch DevWorkspaces until the stream ends.
pub async fn watch_workspaces(
    client: Client,
    reconciler: Arc<Reconciler>,
) -> Result<(), ControllerError> {
    let namespace = reconciler.config.watch_namespace.clone();
    info!(
        "Starting DevWorkspace watcher (namespace: {})",
        namespace.as_deref().unwrap_or("<all>")
    );

    // Owned objects always carry the workspace id label
    let owned = || watcher::Config::default().labels(WORKSPACE_ID_LABEL);
    let ns = namespace.as_deref();

    let workspaces = scoped_api::<DevWorkspace>(&client, ns);
    let mut controller = Controller::new(workspaces, watcher::Config::default())
        .owns(scoped_api::<Deployment>(&client, ns), owned())
        .owns(scoped_api::<Service>(&client, ns), owned())
        .owns(scoped_api::<Ingress>(&client, ns), owned())
        .owns(scoped_api::<ServiceAccount>(&client, ns), owned());
    if reconciler.config.is_openshift {
        controller = controller.owns(scoped_api::<Route>(&client, ns), owned());
    }

    let controller_config = ControllerConfig::default()
        .debounce(DEBOUNCE)
        .concurrency(CONCURRENCY);

    controller
        .with_config(controller_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((object, _)) => debug!(
                    "Reconciled {}/{}",
                    object.namespace.as_deref().unwrap_or_default(),
                    object.name
                ),
                Err(e) => error!("DevWorkspace controller error: {}", e),
            }
        })
        .await;

    info!("DevWorkspace watcher stopped");
    Ok(())
}
