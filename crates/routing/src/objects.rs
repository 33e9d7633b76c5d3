//! Solver inputs and outputs.

use crate::openshift::Route;
use crds::PodAdditions;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::DynamicObject;
use std::collections::BTreeMap;

/// Endpoints declared by the workspace, keyed by component name
pub type EndpointMap = BTreeMap<String, Vec<crds::Endpoint>>;

/// Resolved endpoints, keyed by component name
pub type ExposedEndpointMap = BTreeMap<String, Vec<ExposedEndpoint>>;

/// Aggregate output of a routing solver.
///
/// The same type carries the live objects read back from the cluster when resolving
/// exposed endpoints.
#[derive(Debug, Clone, Default)]
pub struct RoutingObjects {
    pub services: Vec<Service>,
    pub ingresses: Vec<Ingress>,
    pub routes: Vec<Route>,
    /// Created once and never updated; their contents are generated on creation
    pub secrets: Vec<Secret>,
    /// Sidecars and volumes the solver needs in the workspace pod
    pub pod_additions: Option<PodAdditions>,
    /// Annotations for the workspace service account
    pub service_account_annotations: BTreeMap<String, String>,
    /// Cluster-scoped OAuth client; annotated restricted-access by the solver
    pub oauth_client: Option<DynamicObject>,
}

/// Whether an exposed endpoint is reachable from outside the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointVisibility {
    Public,
    Internal,
}

/// A resolved endpoint URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedEndpoint {
    pub name: String,
    pub url: String,
    pub visibility: EndpointVisibility,
    /// Attributes copied from the declaration
    pub attributes: BTreeMap<String, String>,
}

impl ExposedEndpoint {
    pub fn is_main(&self) -> bool {
        self.attributes.get("type").map(String::as_str) == Some("main")
    }
}

/// Pick the workspace entry point: the endpoint typed `main`, else the first public one.
pub fn main_url(exposed: &ExposedEndpointMap) -> Option<String> {
    let all = || exposed.values().flatten();
    all()
        .find(|e| e.is_main())
        .or_else(|| all().find(|e| e.visibility == EndpointVisibility::Public))
        .map(|e| e.url.clone())
}
