//! Workspace metadata threaded through provisioning steps and solver calls.

use crds::WORKSPACE_ID_LABEL;
use std::collections::BTreeMap;

/// Derived, read-only projection of a workspace used for naming and selection.
///
/// Every generated object is named from `workspace_id`, labelled with the pod selector
/// and placed in `namespace`, so independently built objects stay mutually addressable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceMetadata {
    pub workspace_id: String,
    pub namespace: String,
    pub pod_selector: BTreeMap<String, String>,
    pub routing_suffix: Option<String>,
}

impl WorkspaceMetadata {
    pub fn new(
        workspace_id: impl Into<String>,
        namespace: impl Into<String>,
        routing_suffix: Option<String>,
    ) -> Self {
        let workspace_id = workspace_id.into();
        let pod_selector = BTreeMap::from([(WORKSPACE_ID_LABEL.to_string(), workspace_id.clone())]);
        Self {
            workspace_id,
            namespace: namespace.into(),
            pod_selector,
            routing_suffix: routing_suffix.filter(|s| !s.is_empty()),
        }
    }

    /// Labels applied to every generated object
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.pod_selector.clone()
    }

    /// Label selector string matching every generated object
    pub fn label_selector(&self) -> String {
        format!("{}={}", WORKSPACE_ID_LABEL, self.workspace_id)
    }
}
