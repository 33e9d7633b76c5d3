//! The routing solver interface and the closed set of routing classes.

use crate::error::SolverError;
use crate::metadata::WorkspaceMetadata;
use crate::objects::{EndpointMap, ExposedEndpointMap, RoutingObjects};
use cluster_client::ClusterClient;
use std::str::FromStr;

/// Supported routing classes. The set is closed: each class maps to exactly one solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingClass {
    /// Services plus routes (OpenShift) or ingresses, no authentication
    Basic,
    /// Routes fronted by an OpenShift oauth-proxy sidecar
    PlatformOAuth,
    /// Cluster-internal services only
    Cluster,
    /// Cluster-internal services with OpenShift serving certificates
    ClusterTls,
    /// Serving-cert services and re-encrypt routes for the web terminal
    WebTerminal,
}

impl RoutingClass {
    pub const ALL: [RoutingClass; 5] = [
        RoutingClass::Basic,
        RoutingClass::PlatformOAuth,
        RoutingClass::Cluster,
        RoutingClass::ClusterTls,
        RoutingClass::WebTerminal,
    ];

    /// Class name as used in `spec.routingClass`
    pub fn as_str(self) -> &'static str {
        match self {
            RoutingClass::Basic => "basic",
            RoutingClass::PlatformOAuth => "openshift-oauth",
            RoutingClass::Cluster => "cluster",
            RoutingClass::ClusterTls => "cluster-tls",
            RoutingClass::WebTerminal => crds::WEB_TERMINAL_ROUTING_CLASS,
        }
    }

    /// Whether the class needs OpenShift routes, OAuth or the service CA
    pub fn requires_openshift(self) -> bool {
        matches!(
            self,
            RoutingClass::PlatformOAuth | RoutingClass::ClusterTls | RoutingClass::WebTerminal
        )
    }
}

impl FromStr for RoutingClass {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoutingClass::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| SolverError::RoutingNotSupported(s.to_string()))
    }
}

impl std::fmt::Display for RoutingClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable settings shared by all solvers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverConfig {
    /// Cluster serves OpenShift routes and OAuth
    pub is_openshift: bool,
    /// Image for the oauth-proxy sidecar
    pub oauth_proxy_image: String,
}

/// Decides which network objects expose a workspace and maps them back to URLs.
#[async_trait::async_trait]
pub trait RoutingSolver: Send + Sync {
    /// Class this solver implements
    fn routing_class(&self) -> RoutingClass;

    /// Whether cleanup must run before the workspace may be deleted
    fn requires_finalizer(&self) -> bool {
        false
    }

    /// Remove objects that owner references cannot garbage collect
    async fn finalize(
        &self,
        _client: &dyn ClusterClient,
        _meta: &WorkspaceMetadata,
    ) -> Result<(), SolverError> {
        Ok(())
    }

    /// Desired object set for the workspace. Deterministic for the same inputs.
    fn get_spec_objects(
        &self,
        endpoints: &EndpointMap,
        meta: &WorkspaceMetadata,
    ) -> Result<RoutingObjects, SolverError>;

    /// Resolve endpoint URLs from live objects.
    ///
    /// Returns `ready = false` when any endpoint cannot be resolved yet; the returned
    /// map must then be ignored by the caller.
    fn get_exposed_endpoints(
        &self,
        endpoints: &EndpointMap,
        objects: &RoutingObjects,
    ) -> Result<(ExposedEndpointMap, bool), SolverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_names_round_trip() {
        for class in RoutingClass::ALL {
            assert_eq!(class.as_str().parse::<RoutingClass>().unwrap(), class);
        }
    }

    #[test]
    fn test_unknown_class_not_supported() {
        let err = "istio".parse::<RoutingClass>().unwrap_err();
        assert!(matches!(err, SolverError::RoutingNotSupported(ref c) if c == "istio"));
    }
}
