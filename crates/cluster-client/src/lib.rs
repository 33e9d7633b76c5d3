//! Cluster Client
//!
//! The single seam between the DevWorkspace controller and the cluster object store.
//! Everything the reconciler reads or writes goes through [`ClusterClient`], which
//! keeps provisioning steps and routing solvers testable without a cluster.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClient, KubeClusterClient, ResourceKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::new(kube::Client::try_default().await?);
//!
//! // Look up a workspace deployment
//! let deployment = client
//!     .get_object(ResourceKind::Deployment, Some("user-ns"), "workspace1a2b3c4d5e6f")
//!     .await?;
//!
//! // Detect OpenShift
//! let is_openshift = client.api_group_available("route.openshift.io").await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Dynamic objects**: one code path for every kind the controller manages, including
//!   OpenShift routes and OAuth clients that have no k8s-openapi types
//! - **Typed conversion**: [`to_dynamic`] / [`from_dynamic`] bridge to k8s-openapi types
//! - **Normalization**: [`normalize`] rewrites objects the way the API server stores them
//! - **Mocking**: `MockClusterClient` behind the `test-util` feature

pub mod client;
pub mod convert;
pub mod error;
pub mod kind;
pub mod normalize;
#[path = "trait.rs"]
pub mod cluster_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClient;
pub use convert::{from_dynamic, to_dynamic};
pub use error::ClusterError;
pub use kind::ResourceKind;
pub use normalize::{canonical_quantity, normalize};
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockClusterClient;
