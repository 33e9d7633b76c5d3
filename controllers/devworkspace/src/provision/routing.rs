//! Routing materialization: realize the solver's objects and resolve endpoint URLs.

use super::sync::{create_if_absent_typed, owner_reference, sync_object, sync_typed};
use super::{Blocked, ProvisioningStatus};
use cluster_client::{ClusterClient, ResourceKind};
use crds::{ComponentDescription, DevWorkspace, PodAdditions, ROUTING_FINALIZER};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::ResourceExt;
use kube::api::ObjectMeta;
use routing::oauth::bind_oauth_client;
use routing::{
    EndpointMap, ExposedEndpointMap, RoutingObjects, RoutingSolver, SolverError, SolverRegistry,
    WorkspaceMetadata, main_url,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// What routing hands to the later steps of the same pass
#[derive(Debug, Clone, Default)]
pub struct RoutingOutcome {
    /// Sidecars and volumes for the workspace pod
    pub pod_additions: Option<PodAdditions>,
    /// Merged into the workspace service account
    pub service_account_annotations: BTreeMap<String, String>,
    pub exposed: ExposedEndpointMap,
    pub main_url: Option<String>,
}

/// Endpoints of every resolved component, including injected and plugin containers
pub fn endpoint_map(components: &[ComponentDescription]) -> EndpointMap {
    components
        .iter()
        .filter(|c| !c.endpoints.is_empty())
        .map(|c| (c.name.clone(), c.endpoints.clone()))
        .collect()
}

fn set_owner(meta: &mut ObjectMeta, owner: &OwnerReference) {
    meta.owner_references = Some(vec![owner.clone()]);
}

fn routing_failure(err: SolverError) -> Blocked {
    match err {
        SolverError::Cluster(err) => err.into(),
        SolverError::MissingObject(message) => Blocked::requeue(message),
        other => Blocked::fail(format!(
            "Failed to install network objects required for devworkspace: {other}"
        )),
    }
}

/// Add the routing finalizer before creating anything the solver must clean up.
async fn ensure_finalizer(
    client: &dyn ClusterClient,
    workspace: &DevWorkspace,
) -> ProvisioningStatus<()> {
    if workspace.finalizers().iter().any(|f| f == ROUTING_FINALIZER) {
        return Ok(());
    }
    let mut updated = workspace.clone();
    updated.finalizers_mut().push(ROUTING_FINALIZER.to_string());
    client.replace_workspace(&updated).await?;
    info!("Added routing finalizer to DevWorkspace {}", workspace.name_any());
    Ok(())
}

/// Write the desired objects and collect their live versions
async fn sync_routing_objects(
    client: &dyn ClusterClient,
    desired: RoutingObjects,
    meta: &WorkspaceMetadata,
    owner: &OwnerReference,
) -> ProvisioningStatus<RoutingObjects> {
    let mut live = RoutingObjects {
        pod_additions: desired.pod_additions,
        service_account_annotations: desired.service_account_annotations,
        ..Default::default()
    };

    for mut secret in desired.secrets {
        set_owner(&mut secret.metadata, owner);
        let (synced, _) = create_if_absent_typed(client, ResourceKind::Secret, &secret).await?;
        live.secrets.push(synced);
    }
    for mut service in desired.services {
        set_owner(&mut service.metadata, owner);
        let (synced, _) = sync_typed(client, ResourceKind::Service, &service).await?;
        live.services.push(synced);
    }
    for mut ingress in desired.ingresses {
        set_owner(&mut ingress.metadata, owner);
        let (synced, _) = sync_typed(client, ResourceKind::Ingress, &ingress).await?;
        live.ingresses.push(synced);
    }
    for mut route in desired.routes {
        set_owner(&mut route.metadata, owner);
        let (synced, _) = sync_typed(client, ResourceKind::Route, &route).await?;
        live.routes.push(synced);
    }
    // Cluster scoped: an owner reference cannot reach it, the finalizer cleans it up
    if let Some(mut oauth_client) = desired.oauth_client {
        bind_oauth_client(&mut oauth_client, meta, &live).map_err(routing_failure)?;
        let (synced, _) = sync_object(client, ResourceKind::OAuthClient, &oauth_client).await?;
        live.oauth_client = Some(synced);
    }
    Ok(live)
}

/// Delete labelled objects of `kind` that are no longer desired
async fn delete_stale(
    client: &dyn ClusterClient,
    kind: ResourceKind,
    meta: &WorkspaceMetadata,
    desired: &BTreeSet<String>,
) -> ProvisioningStatus<()> {
    let existing = client.list_objects(kind, &meta.namespace, &meta.label_selector()).await?;
    for object in existing {
        let name = object.name_any();
        if !desired.contains(&name) {
            client.delete_object(kind, Some(&meta.namespace), &name).await?;
            info!("Deleted stale {} {}/{}", kind, meta.namespace, name);
        }
    }
    Ok(())
}

fn names<'a>(metas: impl Iterator<Item = &'a ObjectMeta>) -> BTreeSet<String> {
    metas.filter_map(|m| m.name.clone()).collect()
}

/// Sync routing for the workspace and resolve its endpoints.
///
/// Requeues until every endpoint resolves to a concrete address.
pub async fn sync_routing(
    client: &dyn ClusterClient,
    registry: &SolverRegistry,
    workspace: &DevWorkspace,
    meta: &WorkspaceMetadata,
    components: &[ComponentDescription],
) -> ProvisioningStatus<RoutingOutcome> {
    let solver: Box<dyn RoutingSolver> = registry
        .get_solver(workspace.routing_class())
        .map_err(routing_failure)?;
    let endpoints = endpoint_map(components);
    let desired = solver
        .get_spec_objects(&endpoints, meta)
        .map_err(routing_failure)?;

    if solver.requires_finalizer() {
        ensure_finalizer(client, workspace).await?;
    }

    let desired_services = names(desired.services.iter().map(|s| &s.metadata));
    let desired_ingresses = names(desired.ingresses.iter().map(|i| &i.metadata));
    let desired_routes = names(desired.routes.iter().map(|r| &r.metadata));
    let desired_secrets = names(desired.secrets.iter().map(|s| &s.metadata));

    let owner = owner_reference(workspace)?;
    let live = sync_routing_objects(client, desired, meta, &owner).await?;

    delete_stale(client, ResourceKind::Service, meta, &desired_services).await?;
    delete_stale(client, ResourceKind::Secret, meta, &desired_secrets).await?;
    delete_stale(client, ResourceKind::Ingress, meta, &desired_ingresses).await?;
    if registry.config().is_openshift {
        delete_stale(client, ResourceKind::Route, meta, &desired_routes).await?;
    }

    let (exposed, ready) = solver
        .get_exposed_endpoints(&endpoints, &live)
        .map_err(routing_failure)?;
    if !ready {
        debug!("Routing for {} is not ready yet", meta.workspace_id);
        return Err(Blocked::requeue("Waiting for DevWorkspace routing objects to be ready"));
    }

    let main_url = main_url(&exposed);
    Ok(RoutingOutcome {
        pod_additions: live.pod_additions,
        service_account_annotations: live.service_account_annotations,
        exposed,
        main_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{container_component, test_workspace, workspace_meta};
    use cluster_client::MockClusterClient;
    use cluster_client::mock::MockWrite;
    use k8s_openapi::api::core::v1::{Secret, Service};
    use routing::oauth::{CLIENT_SECRET_KEY, proxy_secret_name};
    use routing::{RoutingClass, SolverConfig};
    use serde_json::json;

    fn registry(is_openshift: bool) -> SolverRegistry {
        SolverRegistry::new(
            RoutingClass::Basic,
            SolverConfig {
                is_openshift,
                oauth_proxy_image: "proxy:latest".to_string(),
            },
        )
    }

    fn components(endpoints: &[(&str, i32, bool)]) -> Vec<ComponentDescription> {
        let component = container_component("tools", endpoints);
        vec![ComponentDescription {
            name: component.name.clone(),
            endpoints: component.container.map(|c| c.endpoints).unwrap_or_default(),
            ..Default::default()
        }]
    }

    #[tokio::test]
    async fn test_internal_endpoints_only_service() {
        let client = MockClusterClient::new();
        let workspace = test_workspace("ws", "dev");
        let meta = workspace_meta(&workspace);

        let http = components(&[("http", 8080, false)]);
        let outcome = sync_routing(&client, &registry(false), &workspace, &meta, &http)
            .await
            .unwrap();

        assert!(outcome.exposed.values().all(Vec::is_empty));
        assert_eq!(outcome.main_url, None);
        let services = client.objects_of_kind(ResourceKind::Service);
        assert_eq!(services.len(), 1);
        let service: Service = cluster_client::from_dynamic(&services[0]).unwrap();
        assert_eq!(service.metadata.owner_references.unwrap()[0].kind, "DevWorkspace");
        assert!(client.objects_of_kind(ResourceKind::Ingress).is_empty());
    }

    #[tokio::test]
    async fn test_public_endpoint_waits_for_ingress_address() {
        let client = MockClusterClient::new();
        let workspace = test_workspace("ws", "dev");
        let meta = workspace_meta(&workspace);
        let components = components(&[("web", 8080, true)]);

        let result = sync_routing(&client, &registry(false), &workspace, &meta, &components).await;
        assert!(matches!(result, Err(Blocked::Requeue(_))));

        let ingress = client.objects_of_kind(ResourceKind::Ingress).remove(0);
        client
            .set_object_status(
                ResourceKind::Ingress,
                Some("dev"),
                &ingress.name_any(),
                json!({"loadBalancer": {"ingress": [{"ip": "10.0.0.1"}]}}),
            )
            .unwrap();

        client.clear_writes();
        let outcome = sync_routing(&client, &registry(false), &workspace, &meta, &components)
            .await
            .unwrap();
        assert_eq!(client.write_count(), 0, "second pass must not rewrite objects");
        let url = outcome.main_url.unwrap();
        assert!(url.starts_with("http://"));
        assert!(url.contains(".apps.example.com"));
    }

    #[tokio::test]
    async fn test_stale_objects_deleted() {
        let client = MockClusterClient::new();
        let workspace = test_workspace("ws", "dev");
        let meta = workspace_meta(&workspace);

        let stale = Service {
            metadata: ObjectMeta {
                name: Some("old-endpoint".to_string()),
                namespace: Some("dev".to_string()),
                labels: Some(meta.labels()),
                ..Default::default()
            },
            ..Default::default()
        };
        client.add_object(ResourceKind::Service, &stale).unwrap();

        let http = components(&[("http", 8080, false)]);
        sync_routing(&client, &registry(false), &workspace, &meta, &http)
            .await
            .unwrap();
        assert!(client.object(ResourceKind::Service, Some("dev"), "old-endpoint").is_none());
    }

    #[tokio::test]
    async fn test_unsupported_class_fails_startup() {
        let client = MockClusterClient::new();
        let mut workspace = test_workspace("ws", "dev");
        workspace.spec.routing_class = Some("openshift-oauth".to_string());
        let meta = workspace_meta(&workspace);

        match sync_routing(&client, &registry(false), &workspace, &meta, &components(&[])).await {
            Err(Blocked::FailStartup(message)) => {
                let expected = "Failed to install network objects required for devworkspace";
                assert!(message.starts_with(expected));
            }
            other => panic!("expected startup failure, got {other:?}"),
        }
        assert_eq!(client.write_count(), 0);
    }

    #[tokio::test]
    async fn test_oauth_adds_finalizer() {
        let client = MockClusterClient::openshift();
        let mut workspace = test_workspace("ws", "dev");
        workspace.spec.routing_class = Some("openshift-oauth".to_string());
        client.add_workspace(workspace.clone());
        let workspace = client.workspace("dev", "ws").unwrap();
        let meta = workspace_meta(&workspace);

        let web = components(&[("web", 8080, true)]);
        let result = sync_routing(&client, &registry(true), &workspace, &meta, &web).await;
        assert!(matches!(result, Err(Blocked::Requeue(_))), "routes are not admitted yet");

        let stored = client.workspace("dev", "ws").unwrap();
        assert!(stored.finalizers().iter().any(|f| f == ROUTING_FINALIZER));
        assert_eq!(client.objects_of_kind(ResourceKind::OAuthClient).len(), 1);
    }

    #[tokio::test]
    async fn test_oauth_secret_generated_once_and_bound_to_client() {
        let client = MockClusterClient::openshift();
        let mut workspace = test_workspace("ws", "dev");
        workspace.spec.routing_class = Some("openshift-oauth".to_string());
        client.add_workspace(workspace.clone());
        let mut meta = workspace_meta(&workspace);
        meta.routing_suffix = None;
        let components = components(&[("web", 8080, true)]);

        let workspace = client.workspace("dev", "ws").unwrap();
        let result = sync_routing(&client, &registry(true), &workspace, &meta, &components).await;
        assert!(matches!(result, Err(Blocked::Requeue(_))));

        let route = client.objects_of_kind(ResourceKind::Route).remove(0);
        client
            .set_object_status(
                ResourceKind::Route,
                Some("dev"),
                &route.name_any(),
                json!({"ingress": [{"host": "web.router.example.com"}]}),
            )
            .unwrap();

        let workspace = client.workspace("dev", "ws").unwrap();
        let outcome = sync_routing(&client, &registry(true), &workspace, &meta, &components)
            .await
            .unwrap();
        assert_eq!(outcome.main_url.as_deref(), Some("https://web.router.example.com/"));

        let secret_name = proxy_secret_name(&meta.workspace_id);
        let secret_creates = client
            .writes()
            .into_iter()
            .filter(|(write, kind, _)| *write == MockWrite::Create && *kind == ResourceKind::Secret)
            .count();
        assert_eq!(secret_creates, 1);
        let secret: Secret = client
            .typed_object(ResourceKind::Secret, Some("dev"), &secret_name)
            .unwrap();
        let generated = secret.string_data.unwrap()[CLIENT_SECRET_KEY].clone();

        let oauth = client.objects_of_kind(ResourceKind::OAuthClient).remove(0);
        assert_eq!(oauth.data["secret"], generated.as_str());
        assert_eq!(
            oauth.data["redirectURIs"],
            json!(["https://web.router.example.com/oauth/callback"])
        );

        let proxy = &outcome.pod_additions.unwrap().containers[0];
        assert!(proxy.args.iter().flatten().all(|arg| !arg.contains(&generated)));
    }
}
