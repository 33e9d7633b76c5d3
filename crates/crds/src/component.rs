//! Component descriptions
//!
//! Output of component materialization. Not persisted: recomputed on every
//! reconciliation pass and threaded through routing and workload assembly.

use crate::devworkspace::Endpoint;
use k8s_openapi::api::core::v1::{Container, Volume, VolumeMount};
use serde::{Deserialize, Serialize};

/// Pod-level contribution to be merged into the workspace deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodAdditions {
    #[serde(default)]
    pub containers: Vec<Container>,

    #[serde(default)]
    pub init_containers: Vec<Container>,

    #[serde(default)]
    pub volumes: Vec<Volume>,

    /// Mounts added to every workspace container (not to sidecars contributed here)
    #[serde(default)]
    pub volume_mounts: Vec<VolumeMount>,
}

impl PodAdditions {
    /// True when nothing would be merged into the pod
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
            && self.init_containers.is_empty()
            && self.volumes.is_empty()
            && self.volume_mounts.is_empty()
    }
}

/// A resolved devfile component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescription {
    /// Component name from the template
    pub name: String,

    /// Containers, init containers and volumes contributed by this component
    pub pod_additions: PodAdditions,

    /// Endpoints declared by the component
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    /// Whether the component needs the shared workspace claim
    #[serde(default)]
    pub needs_storage: bool,
}
