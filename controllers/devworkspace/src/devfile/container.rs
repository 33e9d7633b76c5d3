//! Devfile container components to Kubernetes containers.

use crate::provision::storage::STORAGE_VOLUME_NAME;
use crds::ContainerComponent;
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, ResourceRequirements, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use routing::naming;
use std::collections::BTreeMap;

/// Where project sources are mounted when `sourceMapping` is unset
pub const DEFAULT_PROJECTS_ROOT: &str = "/projects";

pub const PROJECTS_ROOT_ENV: &str = "PROJECTS_ROOT";
pub const PROJECT_SOURCE_ENV: &str = "PROJECT_SOURCE";

/// Workspace facts exported to every container
#[derive(Debug, Clone)]
pub struct EnvContext<'a> {
    pub workspace_name: &'a str,
    pub namespace: &'a str,
    pub workspace_id: &'a str,
    pub creator: &'a str,
    pub idle_timeout: &'a str,
}

/// Empty values are left unset, as the API server stores them
fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: (!value.is_empty()).then(|| value.to_string()),
        value_from: None,
    }
}

pub fn common_env_vars(ctx: &EnvContext<'_>) -> Vec<EnvVar> {
    vec![
        env("DEVWORKSPACE_NAMESPACE", ctx.namespace),
        env("DEVWORKSPACE_NAME", ctx.workspace_name),
        env("DEVWORKSPACE_ID", ctx.workspace_id),
        env("DEVWORKSPACE_CREATOR", ctx.creator),
        env("DEVWORKSPACE_IDLE_TIMEOUT", ctx.idle_timeout),
    ]
}

/// Project sources are mounted unless explicitly disabled
pub fn has_mount_sources(component: &ContainerComponent) -> bool {
    component.mount_sources.unwrap_or(true)
}

/// Sub-path of the shared claim holding one workspace's data
pub fn storage_sub_path(workspace_id: &str, name: &str) -> String {
    format!("{workspace_id}/{name}")
}

/// Build the container for a devfile container component
pub fn container_for(
    name: &str,
    component: &ContainerComponent,
    ctx: &EnvContext<'_>,
) -> Container {
    let mut env_vars = common_env_vars(ctx);
    env_vars.extend(component.env.iter().map(|e| env(&e.name, &e.value)));

    let mut volume_mounts = Vec::new();
    if has_mount_sources(component) {
        let source_mapping = component
            .source_mapping
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| DEFAULT_PROJECTS_ROOT.to_string());
        volume_mounts.push(VolumeMount {
            name: STORAGE_VOLUME_NAME.to_string(),
            mount_path: source_mapping.clone(),
            sub_path: Some(storage_sub_path(ctx.workspace_id, "projects")),
            ..Default::default()
        });
        env_vars.push(env(PROJECTS_ROOT_ENV, &source_mapping));
        env_vars.push(env(PROJECT_SOURCE_ENV, &source_mapping));
    }

    let ports: Vec<ContainerPort> = component
        .endpoints
        .iter()
        .map(|endpoint| ContainerPort {
            name: Some(naming::port_name(&endpoint.name)),
            container_port: endpoint.target_port,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        })
        .collect();

    let resources = component.memory_limit.as_ref().map(|limit| ResourceRequirements {
        limits: Some(BTreeMap::from([("memory".to_string(), Quantity(limit.clone()))])),
        ..Default::default()
    });

    Container {
        name: name.to_string(),
        image: Some(component.image.clone()),
        command: (!component.command.is_empty()).then(|| component.command.clone()),
        args: (!component.args.is_empty()).then(|| component.args.clone()),
        env: Some(env_vars),
        ports: (!ports.is_empty()).then_some(ports),
        resources,
        volume_mounts: (!volume_mounts.is_empty()).then_some(volume_mounts),
        ..Default::default()
    }
}
