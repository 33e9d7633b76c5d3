//! Maps routing class names to solvers.

use crate::basic::BasicSolver;
use crate::cluster::{ClusterSolver, ClusterTlsSolver};
use crate::error::SolverError;
use crate::oauth::OAuthSolver;
use crate::solver::{RoutingClass, RoutingSolver, SolverConfig};
use crate::web_terminal::WebTerminalSolver;

/// Looks up the solver for a routing class.
///
/// Holds no per-workspace state; every lookup builds a fresh solver from the
/// shared configuration.
#[derive(Debug, Clone)]
pub struct SolverRegistry {
    default_class: RoutingClass,
    config: SolverConfig,
}

impl SolverRegistry {
    pub fn new(default_class: RoutingClass, config: SolverConfig) -> Self {
        Self { default_class, config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Resolve a class name, falling back to the default when unset or empty.
    ///
    /// Errors with `RoutingNotSupported` for unknown names and `PlatformMismatch` when
    /// the class needs OpenShift and the cluster is not OpenShift.
    pub fn resolve_class(&self, name: Option<&str>) -> Result<RoutingClass, SolverError> {
        let class = match name.filter(|n| !n.is_empty()) {
            Some(name) => name.parse::<RoutingClass>()?,
            None => self.default_class,
        };
        if class.requires_openshift() && !self.config.is_openshift {
            return Err(SolverError::PlatformMismatch(class.to_string()));
        }
        Ok(class)
    }

    pub fn get_solver(&self, name: Option<&str>) -> Result<Box<dyn RoutingSolver>, SolverError> {
        let solver: Box<dyn RoutingSolver> = match self.resolve_class(name)? {
            RoutingClass::Basic => Box::new(BasicSolver::new(self.config.is_openshift)),
            RoutingClass::PlatformOAuth => {
                Box::new(OAuthSolver::new(self.config.oauth_proxy_image.clone()))
            }
            RoutingClass::Cluster => Box::new(ClusterSolver),
            RoutingClass::ClusterTls => Box::new(ClusterTlsSolver),
            RoutingClass::WebTerminal => Box::new(WebTerminalSolver),
        };
        Ok(solver)
    }
}
