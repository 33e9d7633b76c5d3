//! Web terminal routing: serving-cert services behind re-encrypting routes.

use crate::cluster::serving_cert_annotations;
use crate::common::{self, all_endpoints};
use crate::error::SolverError;
use crate::metadata::WorkspaceMetadata;
use crate::naming;
use crate::objects::{EndpointMap, ExposedEndpointMap, RoutingObjects};
use crate::openshift::TLS_TERMINATION_REENCRYPT;
use crate::solver::{RoutingClass, RoutingSolver};

#[derive(Debug, Clone, Default)]
pub struct WebTerminalSolver;

#[async_trait::async_trait]
impl RoutingSolver for WebTerminalSolver {
    fn routing_class(&self) -> RoutingClass {
        RoutingClass::WebTerminal
    }

    fn get_spec_objects(
        &self,
        endpoints: &EndpointMap,
        meta: &WorkspaceMetadata,
    ) -> Result<RoutingObjects, SolverError> {
        let routes = all_endpoints(endpoints)
            .filter(|(_, e)| e.is_public())
            .map(|(_, e)| {
                common::route_for_endpoint(
                    e,
                    meta,
                    TLS_TERMINATION_REENCRYPT,
                    naming::service_name(&meta.workspace_id),
                    e.target_port,
                )
            })
            .collect();
        Ok(RoutingObjects {
            services: common::services_for_endpoints(
                endpoints,
                meta,
                &serving_cert_annotations(meta),
            ),
            routes,
            ..Default::default()
        })
    }

    fn get_exposed_endpoints(
        &self,
        endpoints: &EndpointMap,
        objects: &RoutingObjects,
    ) -> Result<(ExposedEndpointMap, bool), SolverError> {
        Ok(common::exposed_via_routes(endpoints, &objects.routes))
    }
}
