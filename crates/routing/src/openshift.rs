//! OpenShift routing resources.
//!
//! `Route` is declared here with schema generation disabled since the CRD is owned
//! by OpenShift. `OAuthClient` is cluster scoped and only ever written, so it is
//! built directly as a `DynamicObject`.

use crate::metadata::WorkspaceMetadata;
use crate::naming;
use cluster_client::ResourceKind;
use crds::RESTRICTED_ACCESS_ANNOTATION;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use kube::api::DynamicObject;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Edge termination: TLS ends at the router
pub const TLS_TERMINATION_EDGE: &str = "edge";

/// Re-encrypt termination: the router opens a new TLS connection to the service
pub const TLS_TERMINATION_REENCRYPT: &str = "reencrypt";

/// Annotation asking the service CA operator to issue a serving certificate
pub const SERVING_CERT_ANNOTATION: &str = "service.beta.openshift.io/serving-cert-secret-name";

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[kube(
    group = "route.openshift.io",
    version = "v1",
    kind = "Route",
    namespaced,
    status = "RouteStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    /// Requested host; assigned by the router when empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    pub to: RouteTargetReference,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<RoutePort>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteTargetReference {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutePort {
    pub target_port: IntOrString,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    pub termination: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insecure_edge_termination_policy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteStatus {
    #[serde(default)]
    pub ingress: Vec<RouteIngress>,
}

/// Router admission record
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RouteIngress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_name: Option<String>,
}

impl Route {
    /// Host admitted by a router, once one has picked the route up
    pub fn admitted_host(&self) -> Option<&str> {
        self.status
            .as_ref()?
            .ingress
            .iter()
            .find_map(|i| i.host.as_deref().filter(|h| !h.is_empty()))
    }
}

/// Build the OAuth client used by the oauth-proxy sidecars of one workspace.
///
/// The object is cluster scoped, so it cannot be garbage collected through an owner
/// reference and carries the restricted-access marker itself.
pub fn oauth_client(
    meta: &WorkspaceMetadata,
    secret: &str,
    redirect_uris: Vec<String>,
) -> DynamicObject {
    let resource = ResourceKind::OAuthClient.api_resource();
    let mut client = DynamicObject::new(&naming::oauth_client_name(&meta.workspace_id), &resource)
        .data(serde_json::json!({
            "secret": secret,
            "redirectURIs": redirect_uris,
            "grantMethod": "prompt",
        }));
    client.metadata.labels = Some(meta.labels());
    client.metadata.annotations = Some(BTreeMap::from([(
        RESTRICTED_ACCESS_ANNOTATION.to_string(),
        "true".to_string(),
    )]));
    client
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::Resource;

    #[test]
    fn test_route_type_meta() {
        assert_eq!(Route::api_version(&()), "route.openshift.io/v1");
        assert_eq!(Route::kind(&()), "Route");
    }

    #[test]
    fn test_admitted_host_skips_empty_entries() {
        let mut route = Route::new("r", RouteSpec::default());
        assert_eq!(route.admitted_host(), None);

        route.status = Some(RouteStatus {
            ingress: vec![
                RouteIngress { host: Some(String::new()), router_name: None },
                RouteIngress {
                    host: Some("ws-web-8080.apps.example.com".to_string()),
                    router_name: Some("default".to_string()),
                },
            ],
        });
        assert_eq!(route.admitted_host(), Some("ws-web-8080.apps.example.com"));
    }

    #[test]
    fn test_oauth_client_is_restricted() {
        let meta = WorkspaceMetadata::new("workspace1234", "ns", None);
        let client = oauth_client(&meta, "s3cret", vec!["https://host/oauth/callback".to_string()]);
        assert_eq!(client.metadata.name.as_deref(), Some("workspace1234-oauth-client"));
        assert_eq!(client.metadata.namespace, None);
        let annotations = client.metadata.annotations.unwrap();
        assert_eq!(
            annotations.get(RESTRICTED_ACCESS_ANNOTATION).map(String::as_str),
            Some("true")
        );
        assert_eq!(client.data["redirectURIs"][0], "https://host/oauth/callback");
        assert_eq!(client.types.unwrap().kind, "OAuthClient");
    }
}
