//! Test utilities for unit testing provisioning steps and the reconciler
//!
//! This module provides builders for test workspaces and a scripted readiness probe.

use crate::readiness::ReadinessProbe;
use async_trait::async_trait;
use crds::*;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use routing::WorkspaceMetadata;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// UID shared by test workspaces; derives id `workspace1a2b3c4d5e6f4a1b`
pub const TEST_UID: &str = "1a2b3c4d-5e6f-4a1b-8c2d-3e4f5a6b7c8d";

/// Id derived from [`TEST_UID`]
pub const TEST_WORKSPACE_ID: &str = "workspace1a2b3c4d5e6f4a1b";

/// Creator recorded on test workspaces
pub const TEST_CREATOR: &str = "creator-uid";

pub const TEST_ROUTING_SUFFIX: &str = "apps.example.com";

/// Started workspace with a creator label and a uid, but no components
pub fn test_workspace(name: &str, namespace: &str) -> DevWorkspace {
    DevWorkspace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(TEST_UID.to_string()),
            labels: Some(BTreeMap::from([(CREATOR_LABEL.to_string(), TEST_CREATOR.to_string())])),
            ..Default::default()
        },
        spec: DevWorkspaceSpec {
            started: true,
            ..Default::default()
        },
        status: None,
    }
}

/// Container component with `(name, port, public)` endpoints
pub fn container_component(name: &str, endpoints: &[(&str, i32, bool)]) -> Component {
    Component {
        name: name.to_string(),
        container: Some(ContainerComponent {
            image: "quay.io/devfile/universal-developer-image:latest".to_string(),
            endpoints: endpoints
                .iter()
                .map(|(endpoint, port, public)| Endpoint {
                    name: (*endpoint).to_string(),
                    target_port: *port,
                    path: None,
                    attributes: if *public {
                        BTreeMap::from([("public".to_string(), "true".to_string())])
                    } else {
                        BTreeMap::new()
                    },
                })
                .collect(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Metadata for a test workspace, using its persisted id when set
pub fn workspace_meta(workspace: &DevWorkspace) -> WorkspaceMetadata {
    WorkspaceMetadata::new(
        workspace.workspace_id().unwrap_or(TEST_WORKSPACE_ID),
        workspace.metadata.namespace.clone().unwrap_or_default(),
        Some(TEST_ROUTING_SUFFIX.to_string()),
    )
}

/// Readiness probe returning a fixed answer and recording the probed URLs
#[derive(Debug, Default)]
pub struct StaticProbe {
    ready: bool,
    probed: Mutex<Vec<String>>,
}

impl StaticProbe {
    pub fn new(ready: bool) -> Self {
        Self {
            ready,
            probed: Mutex::new(Vec::new()),
        }
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadinessProbe for StaticProbe {
    async fn is_ready(&self, main_url: &str) -> bool {
        self.probed.lock().unwrap().push(main_url.to_string());
        self.ready
    }
}
