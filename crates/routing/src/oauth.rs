//! OpenShift OAuth routing.
//!
//! Every public endpoint is fronted by an oauth-proxy sidecar. Routes re-encrypt to a
//! dedicated proxy service whose serving certificate the sidecars present. The OAuth
//! client is cluster scoped, so the solver owns its deletion through a finalizer.
//!
//! The client and cookie secrets are random and live in a per-workspace Secret that is
//! created once and never rewritten. Sidecars read them through env references, and
//! [`bind_oauth_client`] copies the client secret into the OAuth client together with
//! the callback of every route host once the routes exist.

use crate::common::{self, all_endpoints};
use crate::error::SolverError;
use crate::metadata::WorkspaceMetadata;
use crate::naming;
use crate::objects::{EndpointMap, ExposedEndpointMap, RoutingObjects};
use crate::openshift::{self, Route, SERVING_CERT_ANNOTATION, TLS_TERMINATION_REENCRYPT};
use crate::solver::{RoutingClass, RoutingSolver};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use cluster_client::{ClusterClient, ResourceKind};
use crds::{Endpoint, PodAdditions};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, Secret, SecretKeySelector, SecretVolumeSource,
    Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{DynamicObject, ObjectMeta};
use rand::RngCore;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// First port the proxies listen on; each public endpoint takes the next one
pub const PROXY_BASE_PORT: i32 = 4400;

const PROXY_TLS_VOLUME: &str = "oauth-proxy-tls";
const PROXY_TLS_MOUNT_PATH: &str = "/etc/tls/private";
const SA_REDIRECT_ANNOTATION_PREFIX: &str = "serviceaccounts.openshift.io/oauth-redirectreference.";

/// Key of the OAuth client secret in the proxy secret
pub const CLIENT_SECRET_KEY: &str = "client-secret";
/// Key of the cookie secret in the proxy secret
pub const COOKIE_SECRET_KEY: &str = "cookie-secret";

const CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";
const COOKIE_SECRET_ENV: &str = "OAUTH_COOKIE_SECRET";

// 24 bytes encode to 32 characters, a valid AES key length whether or not the
// proxy decodes the value
const COOKIE_SECRET_BYTES: usize = 24;
const CLIENT_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct OAuthSolver {
    oauth_proxy_image: String,
}

impl OAuthSolver {
    pub fn new(oauth_proxy_image: impl Into<String>) -> Self {
        Self {
            oauth_proxy_image: oauth_proxy_image.into(),
        }
    }

    fn proxy_container(
        &self,
        endpoint: &Endpoint,
        proxy_port: i32,
        meta: &WorkspaceMetadata,
    ) -> Container {
        let args = vec![
            format!("--https-address=:{proxy_port}"),
            "--provider=openshift".to_string(),
            format!("--upstream=http://localhost:{}", endpoint.target_port),
            format!("--tls-cert={PROXY_TLS_MOUNT_PATH}/tls.crt"),
            format!("--tls-key={PROXY_TLS_MOUNT_PATH}/tls.key"),
            format!("--client-id={}", naming::oauth_client_name(&meta.workspace_id)),
            format!("--client-secret=$({CLIENT_SECRET_ENV})"),
            format!("--cookie-secret=$({COOKIE_SECRET_ENV})"),
            "--scope=user:info user:check-access".to_string(),
        ];
        let secret_name = proxy_secret_name(&meta.workspace_id);
        Container {
            name: proxy_container_name(endpoint),
            image: Some(self.oauth_proxy_image.clone()),
            args: Some(args),
            env: Some(vec![
                secret_env(CLIENT_SECRET_ENV, &secret_name, CLIENT_SECRET_KEY),
                secret_env(COOKIE_SECRET_ENV, &secret_name, COOKIE_SECRET_KEY),
            ]),
            ports: Some(vec![ContainerPort {
                name: Some(proxy_port_name(endpoint)),
                container_port: proxy_port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            volume_mounts: Some(vec![VolumeMount {
                name: PROXY_TLS_VOLUME.to_string(),
                mount_path: PROXY_TLS_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }
}

fn proxy_container_name(endpoint: &Endpoint) -> String {
    format!("oauth-proxy-{}", naming::endpoint_name(&endpoint.name))
}

fn proxy_port_name(endpoint: &Endpoint) -> String {
    format!("oauth-{}", endpoint.target_port)
}

pub fn proxy_service_name(workspace_id: &str) -> String {
    format!("{workspace_id}-oauth-proxy")
}

/// Secret holding the OAuth client and cookie secrets of one workspace
pub fn proxy_secret_name(workspace_id: &str) -> String {
    format!("{workspace_id}-oauth-proxy")
}

fn secret_env(name: &str, secret_name: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret_name.to_string(),
                key: key.to_string(),
                optional: None,
            }),
            ..Default::default()
        }),
    }
}

fn random_secret(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Fresh proxy secret. Only ever created: rewriting it would invalidate the OAuth client.
fn proxy_secret(meta: &WorkspaceMetadata) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(proxy_secret_name(&meta.workspace_id)),
            namespace: Some(meta.namespace.clone()),
            labels: Some(meta.labels()),
            ..Default::default()
        },
        string_data: Some(BTreeMap::from([
            (CLIENT_SECRET_KEY.to_string(), random_secret(CLIENT_SECRET_BYTES)),
            (COOKIE_SECRET_KEY.to_string(), random_secret(COOKIE_SECRET_BYTES)),
        ])),
        type_: Some("Opaque".to_string()),
        ..Default::default()
    }
}

/// Value of `key` in a live secret, whether the server has moved it into `data` yet or not
fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok())
        .or_else(|| secret.string_data.as_ref()?.get(key).cloned())
        .filter(|value| !value.is_empty())
}

fn redirect_uris(routes: &[Route]) -> Vec<String> {
    let hosts: BTreeSet<&str> = routes
        .iter()
        .filter_map(|r| r.admitted_host().or(r.spec.host.as_deref()))
        .collect();
    hosts
        .into_iter()
        .map(|host| format!("https://{host}/oauth/callback"))
        .collect()
}

/// Complete the desired OAuth client from live routing objects.
///
/// Copies the client secret out of the live proxy secret and registers the callback of
/// every route host, including hosts assigned by the router when no routing suffix is
/// configured. Routes not yet admitted without a requested host are picked up by a
/// later pass.
pub fn bind_oauth_client(
    oauth_client: &mut DynamicObject,
    meta: &WorkspaceMetadata,
    live: &RoutingObjects,
) -> Result<(), SolverError> {
    let secret_name = proxy_secret_name(&meta.workspace_id);
    let secret = live
        .secrets
        .iter()
        .find(|s| s.metadata.name.as_deref() == Some(secret_name.as_str()))
        .and_then(|s| secret_value(s, CLIENT_SECRET_KEY))
        .ok_or_else(|| {
            SolverError::MissingObject(format!("secret {secret_name} has no {CLIENT_SECRET_KEY}"))
        })?;
    if let Some(data) = oauth_client.data.as_object_mut() {
        data.insert("secret".to_string(), secret.into());
        data.insert("redirectURIs".to_string(), redirect_uris(&live.routes).into());
    }
    Ok(())
}

fn public_endpoints(endpoints: &EndpointMap) -> Vec<&Endpoint> {
    all_endpoints(endpoints)
        .filter(|(_, e)| e.is_public())
        .map(|(_, e)| e)
        .collect()
}

#[async_trait::async_trait]
impl RoutingSolver for OAuthSolver {
    fn routing_class(&self) -> RoutingClass {
        RoutingClass::PlatformOAuth
    }

    fn requires_finalizer(&self) -> bool {
        true
    }

    async fn finalize(
        &self,
        client: &dyn ClusterClient,
        meta: &WorkspaceMetadata,
    ) -> Result<(), SolverError> {
        let name = naming::oauth_client_name(&meta.workspace_id);
        client.delete_object(ResourceKind::OAuthClient, None, &name).await?;
        info!("Deleted OAuth client {} for workspace {}", name, meta.workspace_id);
        Ok(())
    }

    fn get_spec_objects(
        &self,
        endpoints: &EndpointMap,
        meta: &WorkspaceMetadata,
    ) -> Result<RoutingObjects, SolverError> {
        let mut objects = RoutingObjects {
            services: common::services_for_endpoints(endpoints, meta, &BTreeMap::new()),
            ..Default::default()
        };

        let public = public_endpoints(endpoints);
        if public.is_empty() {
            return Ok(objects);
        }

        let proxy_service = proxy_service_name(&meta.workspace_id);
        let mut pod_additions = PodAdditions {
            volumes: vec![Volume {
                name: PROXY_TLS_VOLUME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(naming::serving_cert_secret_name(&meta.workspace_id)),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut proxy_ports = Vec::new();

        for (index, endpoint) in public.into_iter().enumerate() {
            let proxy_port = PROXY_BASE_PORT + index as i32;
            pod_additions
                .containers
                .push(self.proxy_container(endpoint, proxy_port, meta));
            proxy_ports.push(ServicePort {
                name: Some(proxy_port_name(endpoint)),
                protocol: Some("TCP".to_string()),
                port: proxy_port,
                target_port: Some(IntOrString::Int(proxy_port)),
                ..Default::default()
            });

            let route = common::route_for_endpoint(
                endpoint,
                meta,
                TLS_TERMINATION_REENCRYPT,
                proxy_service.clone(),
                proxy_port,
            );
            let route_name = route.metadata.name.clone().unwrap_or_default();
            objects.service_account_annotations.insert(
                format!("{SA_REDIRECT_ANNOTATION_PREFIX}{}", naming::endpoint_name(&endpoint.name)),
                serde_json::json!({
                    "kind": "OAuthRedirectReference",
                    "apiVersion": "v1",
                    "reference": { "kind": "Route", "name": route_name },
                })
                .to_string(),
            );
            objects.routes.push(route);
        }

        objects.services.push(Service {
            metadata: ObjectMeta {
                name: Some(proxy_service),
                namespace: Some(meta.namespace.clone()),
                labels: Some(meta.labels()),
                annotations: Some(BTreeMap::from([(
                    SERVING_CERT_ANNOTATION.to_string(),
                    naming::serving_cert_secret_name(&meta.workspace_id),
                )])),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(proxy_ports),
                selector: Some(meta.pod_selector.clone()),
                type_: Some("ClusterIP".to_string()),
                ..Default::default()
            }),
            status: None,
        });
        objects.pod_additions = Some(pod_additions);
        objects.secrets.push(proxy_secret(meta));
        // Secret and redirect URIs are bound from live objects by `bind_oauth_client`
        objects.oauth_client = Some(openshift::oauth_client(meta, "", Vec::new()));
        Ok(objects)
    }

    fn get_exposed_endpoints(
        &self,
        endpoints: &EndpointMap,
        objects: &RoutingObjects,
    ) -> Result<(ExposedEndpointMap, bool), SolverError> {
        Ok(common::exposed_via_routes(endpoints, &objects.routes))
    }
}
