//! Routing solvers for DevWorkspace endpoints.
//!
//! A solver turns the endpoints declared by a workspace into the services, ingresses,
//! routes and pod additions that expose them, and later maps the live objects back to
//! endpoint URLs. The [`SolverRegistry`] selects a solver from the workspace's routing
//! class.
//!
//! # Example
//!
//! ```no_run
//! use routing::{RoutingClass, RoutingSolver, SolverConfig, SolverRegistry, WorkspaceMetadata};
//! use std::collections::BTreeMap;
//!
//! # fn main() -> Result<(), routing::SolverError> {
//! let registry = SolverRegistry::new(
//!     RoutingClass::Basic,
//!     SolverConfig { is_openshift: false, oauth_proxy_image: String::new() },
//! );
//! let solver = registry.get_solver(Some("cluster"))?;
//! let meta = WorkspaceMetadata::new("workspace1234", "dev", None);
//! let objects = solver.get_spec_objects(&BTreeMap::new(), &meta)?;
//! assert!(objects.services.is_empty());
//! # Ok(())
//! # }
//! ```

pub mod basic;
pub mod cluster;
pub(crate) mod common;
pub mod error;
pub mod metadata;
pub mod naming;
pub mod oauth;
pub mod objects;
pub mod openshift;
pub mod registry;
pub mod solver;
pub mod web_terminal;


pub use basic::BasicSolver;
pub use cluster::{ClusterSolver, ClusterTlsSolver};
pub use error::SolverError;
pub use metadata::WorkspaceMetadata;
pub use oauth::OAuthSolver;
pub use objects::{
    EndpointMap, EndpointVisibility, ExposedEndpoint, ExposedEndpointMap, RoutingObjects, main_url,
};
pub use openshift::Route;
pub use registry::SolverRegistry;
pub use solver::{RoutingClass, RoutingSolver, SolverConfig};
pub use web_terminal::WebTerminalSolver;
