//! Object builders and URL resolution shared by the solvers.

use crate::error::SolverError;
use crate::metadata::WorkspaceMetadata;
use crate::naming;
use crate::objects::{EndpointMap, EndpointVisibility, ExposedEndpoint, ExposedEndpointMap};
use crate::openshift::{Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig};
use crds::{ENDPOINT_NAME_ANNOTATION, Endpoint};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use std::collections::{BTreeMap, BTreeSet};

/// URL scheme for resolved endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

fn service_port(endpoint: &Endpoint) -> ServicePort {
    ServicePort {
        name: Some(naming::port_name(&endpoint.name)),
        protocol: Some("TCP".to_string()),
        port: endpoint.target_port,
        target_port: Some(IntOrString::Int(endpoint.target_port)),
        ..Default::default()
    }
}

fn cluster_ip_service(
    name: String,
    ports: Vec<ServicePort>,
    meta: &WorkspaceMetadata,
    annotations: &BTreeMap<String, String>,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(meta.namespace.clone()),
            labels: Some(meta.labels()),
            annotations: (!annotations.is_empty()).then(|| annotations.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(ports),
            selector: Some(meta.pod_selector.clone()),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

/// Iterate every declared endpoint in a stable order
pub(crate) fn all_endpoints(endpoints: &EndpointMap) -> impl Iterator<Item = (&String, &Endpoint)> {
    endpoints
        .iter()
        .flat_map(|(component, list)| list.iter().map(move |e| (component, e)))
}

/// The workspace service exposing every declared port once.
///
/// Returns `None` when no ports are declared; a service without ports is invalid.
pub(crate) fn workspace_service(
    endpoints: &EndpointMap,
    meta: &WorkspaceMetadata,
    annotations: &BTreeMap<String, String>,
) -> Option<Service> {
    let mut seen = BTreeSet::new();
    let ports: Vec<ServicePort> = all_endpoints(endpoints)
        .filter(|(_, e)| seen.insert(e.target_port))
        .map(|(_, e)| service_port(e))
        .collect();
    if ports.is_empty() {
        return None;
    }
    Some(cluster_ip_service(
        naming::service_name(&meta.workspace_id),
        ports,
        meta,
        annotations,
    ))
}

/// One plain service per discoverable endpoint, named after the endpoint.
///
/// Two workspaces in one namespace declaring the same discoverable endpoint will fight
/// over the service; this is a known limitation.
pub(crate) fn discoverable_services(
    endpoints: &EndpointMap,
    meta: &WorkspaceMetadata,
) -> Vec<Service> {
    all_endpoints(endpoints)
        .filter(|(_, e)| e.is_discoverable())
        .map(|(_, e)| {
            cluster_ip_service(
                naming::endpoint_name(&e.name),
                vec![service_port(e)],
                meta,
                &BTreeMap::new(),
            )
        })
        .collect()
}

/// Every service a solver exposes: the workspace service plus discoverable services.
///
/// `workspace_annotations` only go on the workspace service. Annotations that ask a
/// platform controller for a per-service resource (such as a serving certificate secret)
/// must not be repeated on discoverable services.
pub(crate) fn services_for_endpoints(
    endpoints: &EndpointMap,
    meta: &WorkspaceMetadata,
    workspace_annotations: &BTreeMap<String, String>,
) -> Vec<Service> {
    workspace_service(endpoints, meta, workspace_annotations)
        .into_iter()
        .chain(discoverable_services(endpoints, meta))
        .collect()
}

/// Host-based nginx ingress for a public endpoint, rewriting to `/`
pub(crate) fn ingress_for_endpoint(
    endpoint: &Endpoint,
    meta: &WorkspaceMetadata,
) -> Result<Ingress, SolverError> {
    let endpoint_name = naming::endpoint_name(&endpoint.name);
    let host = naming::endpoint_hostname(
        &meta.workspace_id,
        &endpoint_name,
        endpoint.target_port,
        meta.routing_suffix.as_deref(),
    )
    .ok_or_else(|| {
        SolverError::InvalidEndpoint(format!(
            "a routing suffix is required to expose endpoint {} through an ingress",
            endpoint.name
        ))
    })?;

    let annotations = BTreeMap::from([
        ("kubernetes.io/ingress.class".to_string(), "nginx".to_string()),
        ("nginx.ingress.kubernetes.io/rewrite-target".to_string(), "/".to_string()),
        ("nginx.ingress.kubernetes.io/ssl-redirect".to_string(), "false".to_string()),
        (ENDPOINT_NAME_ANNOTATION.to_string(), endpoint.name.clone()),
    ]);

    Ok(Ingress {
        metadata: ObjectMeta {
            name: Some(naming::route_name(&meta.workspace_id, &endpoint_name)),
            namespace: Some(meta.namespace.clone()),
            labels: Some(meta.labels()),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(vec![IngressRule {
                host: Some(host),
                http: Some(HTTPIngressRuleValue {
                    paths: vec![HTTPIngressPath {
                        path: Some("/".to_string()),
                        path_type: "ImplementationSpecific".to_string(),
                        backend: IngressBackend {
                            service: Some(IngressServiceBackend {
                                name: naming::service_name(&meta.workspace_id),
                                port: Some(ServiceBackendPort {
                                    number: Some(endpoint.target_port),
                                    ..Default::default()
                                }),
                            }),
                            ..Default::default()
                        },
                    }],
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    })
}

/// TLS route for a public endpoint.
///
/// `target_service`/`target_port` select what the router forwards to, which is the
/// workspace service for plain solvers and the proxy service for oauth.
pub(crate) fn route_for_endpoint(
    endpoint: &Endpoint,
    meta: &WorkspaceMetadata,
    termination: &str,
    target_service: String,
    target_port: i32,
) -> Route {
    let endpoint_name = naming::endpoint_name(&endpoint.name);
    let host = naming::endpoint_hostname(
        &meta.workspace_id,
        &endpoint_name,
        endpoint.target_port,
        meta.routing_suffix.as_deref(),
    );
    let mut route = Route::new(
        &naming::route_name(&meta.workspace_id, &endpoint_name),
        RouteSpec {
            host,
            path: None,
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: target_service,
            },
            port: Some(RoutePort {
                target_port: IntOrString::Int(target_port),
            }),
            tls: Some(TlsConfig {
                termination: termination.to_string(),
                insecure_edge_termination_policy: Some("Redirect".to_string()),
            }),
        },
    );
    route.metadata.namespace = Some(meta.namespace.clone());
    route.metadata.labels = Some(meta.labels());
    route.metadata.annotations = Some(BTreeMap::from([
        ("haproxy.router.openshift.io/rewrite-target".to_string(), "/".to_string()),
        (ENDPOINT_NAME_ANNOTATION.to_string(), endpoint.name.clone()),
    ]));
    route
}

fn url_for(scheme: Scheme, authority: &str, path: Option<&str>) -> String {
    let path = path.map(|p| p.trim_start_matches('/')).unwrap_or_default();
    format!("{}://{}/{}", scheme.as_str(), authority, path)
}

fn endpoint_name_of(annotations: Option<&BTreeMap<String, String>>) -> Option<&str> {
    annotations?.get(ENDPOINT_NAME_ANNOTATION).map(String::as_str)
}

fn serves_endpoint(annotations: Option<&BTreeMap<String, String>>, endpoint: &Endpoint) -> bool {
    endpoint_name_of(annotations) == Some(endpoint.name.as_str())
}

fn push_exposed(
    exposed: &mut ExposedEndpointMap,
    component: &str,
    endpoint: &Endpoint,
    url: String,
    visibility: EndpointVisibility,
) {
    exposed
        .entry(component.to_string())
        .or_default()
        .push(ExposedEndpoint {
            name: endpoint.name.clone(),
            url,
            visibility,
            attributes: endpoint.attributes.clone(),
        });
}

/// Resolve public endpoints through admitted routes
pub(crate) fn exposed_via_routes(
    endpoints: &EndpointMap,
    routes: &[Route],
) -> (ExposedEndpointMap, bool) {
    let mut exposed = ExposedEndpointMap::new();
    for (component, endpoint) in all_endpoints(endpoints).filter(|(_, e)| e.is_public()) {
        let host = routes
            .iter()
            .find(|r| serves_endpoint(r.metadata.annotations.as_ref(), endpoint))
            .and_then(Route::admitted_host);
        let Some(host) = host else {
            return (ExposedEndpointMap::new(), false);
        };
        let url = url_for(Scheme::Https, host, endpoint.path.as_deref());
        push_exposed(&mut exposed, component, endpoint, url, EndpointVisibility::Public);
    }
    (exposed, true)
}

/// Resolve public endpoints through ingresses that have a load balancer address
pub(crate) fn exposed_via_ingresses(
    endpoints: &EndpointMap,
    ingresses: &[Ingress],
) -> (ExposedEndpointMap, bool) {
    let mut exposed = ExposedEndpointMap::new();
    for (component, endpoint) in all_endpoints(endpoints).filter(|(_, e)| e.is_public()) {
        let host = ingresses
            .iter()
            .find(|i| serves_endpoint(i.metadata.annotations.as_ref(), endpoint))
            .filter(|i| ingress_has_address(i))
            .and_then(ingress_host);
        let Some(host) = host else {
            return (ExposedEndpointMap::new(), false);
        };
        let url = url_for(Scheme::Http, &host, endpoint.path.as_deref());
        push_exposed(&mut exposed, component, endpoint, url, EndpointVisibility::Public);
    }
    (exposed, true)
}

fn ingress_has_address(ingress: &Ingress) -> bool {
    ingress
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .is_some_and(|entries| {
            entries.iter().any(|e| {
                e.ip.as_deref().is_some_and(|ip| !ip.is_empty())
                    || e.hostname.as_deref().is_some_and(|h| !h.is_empty())
            })
        })
}

fn ingress_host(ingress: &Ingress) -> Option<String> {
    ingress
        .spec
        .as_ref()?
        .rules
        .as_ref()?
        .iter()
        .find_map(|r| r.host.clone())
}

/// Resolve every endpoint (public and internal) to its in-cluster service address
pub(crate) fn exposed_via_services(
    endpoints: &EndpointMap,
    services: &[Service],
    scheme: Scheme,
) -> (ExposedEndpointMap, bool) {
    let mut exposed = ExposedEndpointMap::new();
    for (component, endpoint) in all_endpoints(endpoints) {
        let service = services.iter().find(|s| {
            s.spec.as_ref().is_some_and(|spec| {
                spec.ports
                    .iter()
                    .flatten()
                    .any(|p| p.port == endpoint.target_port)
                    && spec
                        .cluster_ip
                        .as_deref()
                        .is_some_and(|ip| !ip.is_empty() && ip != "None")
            })
        });
        let Some(service) = service else {
            return (ExposedEndpointMap::new(), false);
        };
        let authority = format!(
            "{}.{}.svc:{}",
            service.metadata.name.as_deref().unwrap_or_default(),
            service.metadata.namespace.as_deref().unwrap_or_default(),
            endpoint.target_port
        );
        let visibility = if endpoint.is_public() {
            EndpointVisibility::Public
        } else {
            EndpointVisibility::Internal
        };
        let url = url_for(scheme, &authority, endpoint.path.as_deref());
        push_exposed(&mut exposed, component, endpoint, url, visibility);
    }
    (exposed, true)
}
