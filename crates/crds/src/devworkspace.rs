//! DevWorkspace CRD
//!
//! Declares a developer workspace: a devfile-shaped template of components and
//! commands, the desired run state and the routing class used to expose its
//! endpoints. The status subresource is owned by the controller.

use crate::constants::{
    CREATOR_LABEL, LAST_MODIFIED_BY_ANNOTATION, RESTRICTED_ACCESS_ANNOTATION,
    STOPPED_BY_ANNOTATION,
};
use chrono::{DateTime, Utc};
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[kube(
    group = "workspace.devfile.io",
    version = "v1alpha2",
    kind = "DevWorkspace",
    namespaced,
    shortname = "dw",
    status = "DevWorkspaceStatus",
    printcolumn = r#"{"name":"Workspace ID","type":"string","jsonPath":".status.workspaceId"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"URL","type":"string","jsonPath":".status.mainUrl"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DevWorkspaceSpec {
    /// Desired run state. A stopped workspace keeps its storage but scales its deployment to zero.
    #[serde(default)]
    pub started: bool,

    /// Routing class used to expose endpoints. Empty or absent selects the controller default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing_class: Option<String>,

    /// Devfile-shaped template
    #[serde(default)]
    pub template: DevWorkspaceTemplate,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DevWorkspaceTemplate {
    /// Workspace components
    #[serde(default)]
    pub components: Vec<Component>,

    /// Workspace commands
    #[serde(default)]
    pub commands: Vec<Command>,
}

/// A single devfile component. Exactly one of the union members is expected to be set.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    /// Component name, unique within the template
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerComponent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<VolumeComponent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<PluginComponent>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerComponent {
    /// Container image
    pub image: String,

    /// Memory limit, as a Kubernetes quantity (e.g. "512Mi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,

    /// Whether project sources are mounted into the container. Defaults to true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mount_sources: Option<bool>,

    /// Path where project sources are mounted. Defaults to `/projects`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mapping: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,

    /// Network endpoints served by this container
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// A port served by a container component.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Endpoint name
    pub name: String,

    /// Container port
    pub target_port: i32,

    /// Path appended to the resolved URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Free-form attributes. `public`, `discoverable` and `type` are interpreted by routing.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl Endpoint {
    /// Endpoint is exposed outside the cluster
    pub fn is_public(&self) -> bool {
        self.attribute_is_true("public")
    }

    /// Endpoint gets a dedicated service named after it
    pub fn is_discoverable(&self) -> bool {
        self.attribute_is_true("discoverable")
    }

    /// Endpoint is the workspace's primary entry point
    pub fn is_main(&self) -> bool {
        self.attributes.get("type").map(String::as_str) == Some("main")
    }

    fn attribute_is_true(&self, key: &str) -> bool {
        self.attributes.get(key).map(String::as_str) == Some("true")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeComponent {
    /// Requested size, as a Kubernetes quantity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PluginComponent {
    /// Plugin reference, resolved by the component resolver
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecCommand>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExecCommand {
    /// Component the command runs in
    pub component: String,
    pub command_line: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DevWorkspaceStatus {
    /// Stable workspace identifier derived from the resource UID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,

    /// Current lifecycle phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<WorkspacePhase>,

    /// Named conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<WorkspaceCondition>,

    /// Externally reachable entry point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_url: Option<String>,

    /// Human readable summary of the last pass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DevWorkspaceStatus {
    /// Look up a condition by type
    pub fn condition(&self, condition_type: ConditionType) -> Option<&WorkspaceCondition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }
}

/// Workspace lifecycle phase
///
/// Serializes as PascalCase ("Running", "Failed", ...), matching the printer columns
/// and the values users see in `kubectl get dw`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "PascalCase")]
pub enum WorkspacePhase {
    Starting,
    Running,
    Failed,
    Stopping,
    Stopped,
}

impl WorkspacePhase {
    /// Phase name as written to status
    pub fn as_str(self) -> &'static str {
        match self {
            WorkspacePhase::Starting => "Starting",
            WorkspacePhase::Running => "Running",
            WorkspacePhase::Failed => "Failed",
            WorkspacePhase::Stopping => "Stopping",
            WorkspacePhase::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for WorkspacePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceCondition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,

    /// "True" or "False"
    pub status: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

/// Condition types written by the controller, one per provisioning stage plus `FailedStart`.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
#[serde(rename_all = "PascalCase")]
pub enum ConditionType {
    ComponentsReady,
    StorageReady,
    RoutingReady,
    ServiceAccountReady,
    DeploymentReady,
    FailedStart,
}

impl DevWorkspace {
    /// Routing class requested by the user; `None` when empty or absent
    pub fn routing_class(&self) -> Option<&str> {
        self.spec
            .routing_class
            .as_deref()
            .filter(|class| !class.is_empty())
    }

    /// Recorded creator identity
    pub fn creator(&self) -> Option<&str> {
        self.labels().get(CREATOR_LABEL).map(String::as_str)
    }

    /// Identity of the last caller that modified the resource, stamped at admission
    pub fn last_modified_by(&self) -> Option<&str> {
        self.annotations()
            .get(LAST_MODIFIED_BY_ANNOTATION)
            .map(String::as_str)
    }

    /// Whether the restricted-access marker is set
    pub fn is_restricted_access(&self) -> bool {
        self.annotations()
            .get(RESTRICTED_ACCESS_ANNOTATION)
            .map(String::as_str)
            == Some("true")
    }

    /// Reason recorded the last time the workspace was stopped
    pub fn stopped_by(&self) -> Option<&str> {
        self.annotations()
            .get(STOPPED_BY_ANNOTATION)
            .map(String::as_str)
    }

    /// Workspace id persisted in status, if any
    pub fn workspace_id(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.workspace_id.as_deref())
            .filter(|id| !id.is_empty())
    }

    /// Current phase persisted in status
    pub fn phase(&self) -> Option<WorkspacePhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }

    /// All endpoints declared by container components, keyed by component name
    pub fn endpoints_by_component(&self) -> BTreeMap<String, Vec<Endpoint>> {
        self.spec
            .template
            .components
            .iter()
            .filter_map(|c| {
                c.container
                    .as_ref()
                    .map(|container| (c.name.clone(), container.endpoints.clone()))
            })
            .filter(|(_, endpoints)| !endpoints.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    fn workspace_with(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> DevWorkspace {
        DevWorkspace {
            metadata: ObjectMeta {
                name: Some("ws".to_string()),
                namespace: Some("default".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                ),
                annotations: Some(
                    annotations
                        .iter()
                        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            spec: DevWorkspaceSpec::default(),
            status: None,
        }
    }

    #[test]
    fn test_empty_routing_class_is_none() {
        let mut ws = workspace_with(&[], &[]);
        ws.spec.routing_class = Some(String::new());
        assert_eq!(ws.routing_class(), None);

        ws.spec.routing_class = Some("cluster".to_string());
        assert_eq!(ws.routing_class(), Some("cluster"));
    }

    #[test]
    fn test_identity_accessors() {
        let ws = workspace_with(
            &[(CREATOR_LABEL, "uid-1")],
            &[
                (RESTRICTED_ACCESS_ANNOTATION, "true"),
                (LAST_MODIFIED_BY_ANNOTATION, "uid-2"),
            ],
        );
        assert_eq!(ws.creator(), Some("uid-1"));
        assert_eq!(ws.last_modified_by(), Some("uid-2"));
        assert!(ws.is_restricted_access());
    }

    #[test]
    fn test_endpoint_attributes() {
        let endpoint = Endpoint {
            name: "web".to_string(),
            target_port: 8080,
            path: None,
            attributes: BTreeMap::from([
                ("public".to_string(), "true".to_string()),
                ("discoverable".to_string(), "false".to_string()),
                ("type".to_string(), "main".to_string()),
            ]),
        };
        assert!(endpoint.is_public());
        assert!(!endpoint.is_discoverable());
        assert!(endpoint.is_main());
    }

    #[test]
    fn test_phase_serializes_pascal_case() {
        let status = DevWorkspaceStatus {
            phase: Some(WorkspacePhase::Stopping),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "Stopping");
    }

    #[test]
    fn test_spec_deserializes_from_devfile_yaml() {
        let yaml = r"
started: true
routingClass: basic
template:
  components:
    - name: tools
      container:
        image: quay.io/devfile/universal-developer-image:latest
        memoryLimit: 1Gi
        endpoints:
          - name: http
            targetPort: 3000
            attributes:
              public: 'true'
    - name: m2
      volume:
        size: 2Gi
  commands:
    - id: build
      exec:
        component: tools
        commandLine: make
";
        let spec: DevWorkspaceSpec = serde_yaml::from_str(yaml).unwrap();
        assert!(spec.started);
        assert_eq!(spec.template.components.len(), 2);
        let container = spec.template.components[0].container.as_ref().unwrap();
        assert_eq!(container.endpoints[0].target_port, 3000);
        assert!(container.endpoints[0].is_public());
        assert_eq!(
            spec.template.commands[0].exec.as_ref().unwrap().command_line,
            "make"
        );
    }
}
