//! Cluster-internal routing.
//!
//! Endpoints are only reachable through their services. The TLS variant asks the
//! OpenShift service CA for a serving certificate and mounts it into the workspace.

use crate::common::{self, Scheme};
use crate::error::SolverError;
use crate::metadata::WorkspaceMetadata;
use crate::naming;
use crate::objects::{EndpointMap, ExposedEndpointMap, RoutingObjects};
use crate::openshift::SERVING_CERT_ANNOTATION;
use crate::solver::{RoutingClass, RoutingSolver};
use crds::PodAdditions;
use k8s_openapi::api::core::v1::{SecretVolumeSource, Volume, VolumeMount};
use std::collections::BTreeMap;

/// Volume holding the serving certificate
pub const SERVING_CERT_VOLUME: &str = "workspace-serving-cert";

/// Where the serving certificate is mounted in workspace containers
pub const SERVING_CERT_MOUNT_PATH: &str = "/var/run/secrets/serving-cert";

#[derive(Debug, Clone, Default)]
pub struct ClusterSolver;

#[async_trait::async_trait]
impl RoutingSolver for ClusterSolver {
    fn routing_class(&self) -> RoutingClass {
        RoutingClass::Cluster
    }

    fn get_spec_objects(
        &self,
        endpoints: &EndpointMap,
        meta: &WorkspaceMetadata,
    ) -> Result<RoutingObjects, SolverError> {
        Ok(RoutingObjects {
            services: common::services_for_endpoints(endpoints, meta, &BTreeMap::new()),
            ..Default::default()
        })
    }

    fn get_exposed_endpoints(
        &self,
        endpoints: &EndpointMap,
        objects: &RoutingObjects,
    ) -> Result<(ExposedEndpointMap, bool), SolverError> {
        Ok(common::exposed_via_services(endpoints, &objects.services, Scheme::Http))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterTlsSolver;

/// Serving-cert annotation for services of one workspace
pub(crate) fn serving_cert_annotations(meta: &WorkspaceMetadata) -> BTreeMap<String, String> {
    BTreeMap::from([(
        SERVING_CERT_ANNOTATION.to_string(),
        naming::serving_cert_secret_name(&meta.workspace_id),
    )])
}

#[async_trait::async_trait]
impl RoutingSolver for ClusterTlsSolver {
    fn routing_class(&self) -> RoutingClass {
        RoutingClass::ClusterTls
    }

    fn get_spec_objects(
        &self,
        endpoints: &EndpointMap,
        meta: &WorkspaceMetadata,
    ) -> Result<RoutingObjects, SolverError> {
        let pod_additions = PodAdditions {
            volumes: vec![Volume {
                name: SERVING_CERT_VOLUME.to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(naming::serving_cert_secret_name(&meta.workspace_id)),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            volume_mounts: vec![VolumeMount {
                name: SERVING_CERT_VOLUME.to_string(),
                mount_path: SERVING_CERT_MOUNT_PATH.to_string(),
                read_only: Some(true),
                ..Default::default()
            }],
            ..Default::default()
        };
        Ok(RoutingObjects {
            services: common::services_for_endpoints(
                endpoints,
                meta,
                &serving_cert_annotations(meta),
            ),
            pod_additions: Some(pod_additions),
            ..Default::default()
        })
    }

    fn get_exposed_endpoints(
        &self,
        endpoints: &EndpointMap,
        objects: &RoutingObjects,
    ) -> Result<(ExposedEndpointMap, bool), SolverError> {
        Ok(common::exposed_via_services(endpoints, &objects.services, Scheme::Https))
    }
}
