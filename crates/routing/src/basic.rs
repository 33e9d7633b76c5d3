//! Basic routing: no authentication.
//!
//! Kubernetes: plain-HTTP nginx ingresses. OpenShift: edge-terminated routes.

use crate::common::{self, all_endpoints};
use crate::error::SolverError;
use crate::metadata::WorkspaceMetadata;
use crate::naming;
use crate::objects::{EndpointMap, ExposedEndpointMap, RoutingObjects};
use crate::openshift::TLS_TERMINATION_EDGE;
use crate::solver::{RoutingClass, RoutingSolver};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct BasicSolver {
    is_openshift: bool,
}

impl BasicSolver {
    pub fn new(is_openshift: bool) -> Self {
        Self { is_openshift }
    }
}

#[async_trait::async_trait]
impl RoutingSolver for BasicSolver {
    fn routing_class(&self) -> RoutingClass {
        RoutingClass::Basic
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

        let public = all_endpoints(endpoints).filter(|(_, e)| e.is_public());
        if self.is_openshift {
            objects.routes = public
                .map(|(_, e)| {
                    common::route_for_endpoint(
                        e,
                        meta,
                        TLS_TERMINATION_EDGE,
                        naming::service_name(&meta.workspace_id),
                        e.target_port,
                    )
                })
                .collect();
        } else {
            objects.ingresses = public
                .map(|(_, e)| common::ingress_for_endpoint(e, meta))
                .collect::<Result<_, _>>()?;
        }
        Ok(objects)
    }

    fn get_exposed_endpoints(
        &self,
        endpoints: &EndpointMap,
        objects: &RoutingObjects,
    ) -> Result<(ExposedEndpointMap, bool), SolverError> {
        if self.is_openshift {
            Ok(common::exposed_via_routes(endpoints, &objects.routes))
        } else {
            Ok(common::exposed_via_ingresses(endpoints, &objects.ingresses))
        }
    }
}
