//! Startup timing annotations.
//!
//! When enabled, each provisioning stage stamps the first time it was reached onto the
//! workspace as a Unix timestamp in milliseconds. Once the workspace is ready the
//! per-stage durations are summarized next to them. Stopping a workspace removes every
//! timing annotation so the next start is measured from scratch.

use chrono::{DateTime, Utc};
use cluster_client::ClusterClient;
use crds::DevWorkspace;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, error, info};

pub const COMPONENTS_TOTAL_ANNOTATION: &str = "controller.devfile.io/timing.components_total";
pub const ROUTING_TOTAL_ANNOTATION: &str = "controller.devfile.io/timing.routing_total";
pub const DEPLOYMENT_TOTAL_ANNOTATION: &str = "controller.devfile.io/timing.deployment_total";
pub const SERVERS_TOTAL_ANNOTATION: &str = "controller.devfile.io/timing.servers_total";
pub const WORKSPACE_TOTAL_ANNOTATION: &str = "controller.devfile.io/timing.total";

/// Provisioning milestones, in the order a start reaches them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    WorkspaceStarted,
    ComponentsCreated,
    ComponentsReady,
    RoutingCreated,
    RoutingReady,
    DeploymentCreated,
    DeploymentReady,
    WorkspaceReady,
}

impl Stage {
    pub(crate) const ALL: [Stage; 8] = [
        Stage::WorkspaceStarted,
        Stage::ComponentsCreated,
        Stage::ComponentsReady,
        Stage::RoutingCreated,
        Stage::RoutingReady,
        Stage::DeploymentCreated,
        Stage::DeploymentReady,
        Stage::WorkspaceReady,
    ];

    pub fn annotation(self) -> &'static str {
        match self {
            Stage::WorkspaceStarted => "controller.devfile.io/started-at",
            Stage::ComponentsCreated => "controller.devfile.io/components-created-at",
            Stage::ComponentsReady => "controller.devfile.io/components-ready-at",
            Stage::RoutingCreated => "controller.devfile.io/routing-created-at",
            Stage::RoutingReady => "controller.devfile.io/routing-ready-at",
            Stage::DeploymentCreated => "controller.devfile.io/deployment-created-at",
            Stage::DeploymentReady => "controller.devfile.io/deployment-ready-at",
            Stage::WorkspaceReady => "controller.devfile.io/devworkspace-ready-at",
        }
    }
}

/// Summary annotation and the stages it spans
const SUMMARIES: [(&str, Stage, Stage); 5] = [
    (COMPONENTS_TOTAL_ANNOTATION, Stage::ComponentsCreated, Stage::ComponentsReady),
    (ROUTING_TOTAL_ANNOTATION, Stage::RoutingCreated, Stage::RoutingReady),
    (DEPLOYMENT_TOTAL_ANNOTATION, Stage::DeploymentCreated, Stage::DeploymentReady),
    (SERVERS_TOTAL_ANNOTATION, Stage::DeploymentReady, Stage::WorkspaceReady),
    (WORKSPACE_TOTAL_ANNOTATION, Stage::WorkspaceStarted, Stage::WorkspaceReady),
];

fn is_timing_annotation(key: &str) -> bool {
    Stage::ALL.iter().any(|s| s.annotation() == key)
        || SUMMARIES.iter().any(|(annotation, _, _)| *annotation == key)
}

fn format_millis(millis: i64) -> String {
    format!("{}.{:03}s", millis / 1000, millis % 1000)
}

/// Timing annotations of one workspace as seen at the start of a pass, plus the
/// stages the pass reached.
#[derive(Debug, Clone, Default)]
pub struct StartupTiming {
    enabled: bool,
    observed: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
}

impl StartupTiming {
    pub fn new(enabled: bool, workspace: &DevWorkspace) -> Self {
        let observed: BTreeMap<String, String> = workspace
            .annotations()
            .iter()
            .filter(|(key, _)| is_timing_annotation(key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Self {
            enabled,
            annotations: observed.clone(),
            observed,
        }
    }

    /// Stamp `stage` unless an earlier pass already reached it
    pub fn record(&mut self, stage: Stage, at: DateTime<Utc>) {
        if !self.enabled {
            return;
        }
        self.annotations
            .entry(stage.annotation().to_string())
            .or_insert_with(|| at.timestamp_millis().to_string());
    }

    fn millis(&self, stage: Stage) -> Option<i64> {
        self.annotations.get(stage.annotation())?.parse().ok()
    }

    /// Add the duration of each completed span
    pub fn summarize(&mut self) {
        if !self.enabled {
            return;
        }
        for (annotation, from, to) in SUMMARIES {
            if let (Some(from), Some(to)) = (self.millis(from), self.millis(to)) {
                self.annotations
                    .insert(annotation.to_string(), format_millis((to - from).max(0)));
            }
        }
    }

    /// Drop every timing annotation. Applies even when timing is disabled so stale
    /// annotations do not outlive the setting.
    pub fn clear(&mut self) {
        self.annotations.clear();
    }

    fn get(&self, annotation: &str) -> Option<&str> {
        self.annotations.get(annotation).map(String::as_str)
    }

    pub fn is_changed(&self) -> bool {
        self.observed != self.annotations
    }
}

/// Write changed timing annotations back to the workspace.
///
/// Timing is informational: a conflicting write is dropped and retried by a later
/// pass, other errors are logged. Returns whether the workspace was updated.
pub async fn sync_timing(
    client: &dyn ClusterClient,
    workspace: &DevWorkspace,
    timing: &StartupTiming,
) -> bool {
    if !timing.is_changed() {
        return false;
    }

    let mut updated = workspace.clone();
    let annotations = updated.annotations_mut();
    annotations.retain(|key, _| !is_timing_annotation(key));
    annotations.extend(timing.annotations.clone());

    match client.replace_workspace(&updated).await {
        Ok(_) => {
            debug!("Updated timing annotations of DevWorkspace {}", workspace.name_any());
            true
        }
        Err(e) if e.is_conflict() => {
            info!("Conflict applying timing annotations to DevWorkspace {}", workspace.name_any());
            false
        }
        Err(e) => {
            error!(
                "Failed to apply timing annotations to DevWorkspace {}: {}",
                workspace.name_any(),
                e
            );
            false
        }
    }
}
