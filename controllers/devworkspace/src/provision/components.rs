//! Component materialization: devfile components to pod contributions.

use super::{Blocked, ProvisioningStatus};
use crate::config::ControllerConfig;
use crate::devfile::container::storage_sub_path;
use crate::devfile::{EnvContext, PluginResolver, container_for, has_mount_sources};
use crate::provision::storage::STORAGE_VOLUME_NAME;
use crds::{
    Component, ComponentDescription, ContainerComponent, DevWorkspace, PodAdditions,
    WEB_TERMINAL_ROUTING_CLASS,
};
use k8s_openapi::api::core::v1::VolumeMount;
use kube::ResourceExt;
use tracing::debug;

fn container_description(
    name: &str,
    container: &ContainerComponent,
    ctx: &EnvContext<'_>,
) -> ComponentDescription {
    ComponentDescription {
        name: name.to_string(),
        pod_additions: PodAdditions {
            containers: vec![container_for(name, container, ctx)],
            ..Default::default()
        },
        endpoints: container.endpoints.clone(),
        needs_storage: has_mount_sources(container),
    }
}

fn volume_description(name: &str, workspace_id: &str) -> ComponentDescription {
    ComponentDescription {
        name: name.to_string(),
        pod_additions: PodAdditions {
            volume_mounts: vec![VolumeMount {
                name: STORAGE_VOLUME_NAME.to_string(),
                mount_path: format!("/{name}"),
                sub_path: Some(storage_sub_path(workspace_id, name)),
                ..Default::default()
            }],
            ..Default::default()
        },
        endpoints: Vec::new(),
        needs_storage: true,
    }
}

/// Template components, with the default terminal container injected into web
/// terminals that declare no container of their own.
fn effective_components(workspace: &DevWorkspace, config: &ControllerConfig) -> Vec<Component> {
    let mut components = workspace.spec.template.components.clone();
    let class = workspace
        .routing_class()
        .unwrap_or(config.default_routing_class.as_str());
    if class == WEB_TERMINAL_ROUTING_CLASS && !components.iter().any(|c| c.container.is_some()) {
        debug!("Injecting default terminal container into {}", workspace.name_any());
        components.insert(0, config.default_terminal_component());
    }
    components
}

/// Resolve every template component into a [`ComponentDescription`].
///
/// Pure: reads nothing from the cluster. Unknown plugins and empty templates fail startup.
pub fn resolve_components(
    workspace: &DevWorkspace,
    workspace_id: &str,
    config: &ControllerConfig,
    plugins: &dyn PluginResolver,
) -> ProvisioningStatus<Vec<ComponentDescription>> {
    let components = effective_components(workspace, config);
    if components.is_empty() {
        return Err(Blocked::fail("DevWorkspace template declares no components"));
    }

    let name = workspace.name_any();
    let namespace = workspace.namespace().unwrap_or_default();
    let ctx = EnvContext {
        workspace_name: &name,
        namespace: &namespace,
        workspace_id,
        creator: workspace.creator().unwrap_or_default(),
        idle_timeout: &config.idle_timeout,
    };

    components
        .iter()
        .map(|component| {
            if let Some(container) = &component.container {
                Ok(container_description(&component.name, container, &ctx))
            } else if component.volume.is_some() {
                Ok(volume_description(&component.name, workspace_id))
            } else if let Some(plugin) = &component.plugin {
                let container = plugins
                    .resolve(&plugin.id)
                    .ok_or_else(|| Blocked::fail(format!("could not find plugin {}", plugin.id)))?;
                Ok(container_description(&component.name, &container, &ctx))
            } else {
                Err(Blocked::fail(format!(
                    "component {} must declare a container, volume or plugin",
                    component.name
                )))
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devfile::BuiltinPluginResolver;
    use crate::devfile::plugins::WEB_TERMINAL_PLUGIN_ID;
    use crate::test_utils::{container_component, test_workspace};
    use crds::{PluginComponent, VolumeComponent};

    fn resolve(workspace: &DevWorkspace) -> ProvisioningStatus<Vec<ComponentDescription>> {
        resolve_components(
            workspace,
            "workspace1234",
            &ControllerConfig::default(),
            &BuiltinPluginResolver,
        )
    }

    #[test]
    fn test_container_and_volume() {
        let mut workspace = test_workspace("ws", "dev");
        workspace.spec.template.components = vec![
            container_component("tools", &[("web", 8080, true)]),
            Component {
                name: "cache".to_string(),
                volume: Some(VolumeComponent::default()),
                ..Default::default()
            },
        ];

        let descriptions = resolve(&workspace).unwrap();
        assert_eq!(descriptions.len(), 2);
        assert_eq!(descriptions[0].pod_additions.containers[0].name, "tools");
        assert_eq!(descriptions[0].endpoints[0].target_port, 8080);
        assert!(descriptions[0].needs_storage);

        let mount = &descriptions[1].pod_additions.volume_mounts[0];
        assert_eq!(mount.mount_path, "/cache");
        assert_eq!(mount.sub_path.as_deref(), Some("workspace1234/cache"));
        assert!(descriptions[1].needs_storage);
    }

    #[test]
    fn test_unknown_plugin_fails_startup() {
        let mut workspace = test_workspace("ws", "dev");
        workspace.spec.template.components = vec![Component {
            name: "ide".to_string(),
            plugin: Some(PluginComponent {
                id: "eclipse/theia/next".to_string(),
            }),
            ..Default::default()
        }];

        match resolve(&workspace) {
            Err(Blocked::FailStartup(message)) => {
                assert!(message.contains("could not find plugin eclipse/theia/next"))
            }
            other => panic!("expected startup failure, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_template_fails_startup() {
        let workspace = test_workspace("ws", "dev");
        assert!(matches!(resolve(&workspace), Err(Blocked::FailStartup(_))));
    }

    #[test]
    fn test_web_terminal_gets_default_container() {
        let mut workspace = test_workspace("ws", "dev");
        workspace.spec.routing_class = Some(WEB_TERMINAL_ROUTING_CLASS.to_string());
        workspace.spec.template.components = vec![Component {
            name: "terminal".to_string(),
            plugin: Some(PluginComponent {
                id: WEB_TERMINAL_PLUGIN_ID.to_string(),
            }),
            ..Default::default()
        }];

        let descriptions = resolve(&workspace).unwrap();
        let names: Vec<_> = descriptions.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["dev", "terminal"]);
        assert!(!descriptions[1].needs_storage);
        assert_eq!(descriptions[1].endpoints[0].target_port, 4444);
    }

    #[test]
    fn test_web_terminal_keeps_declared_container() {
        let mut workspace = test_workspace("ws", "dev");
        workspace.spec.routing_class = Some(WEB_TERMINAL_ROUTING_CLASS.to_string());
        workspace.spec.template.components = vec![container_component("shell", &[])];

        let descriptions = resolve(&workspace).unwrap();
        assert_eq!(descriptions.len(), 1);
        assert_eq!(descriptions[0].name, "shell");
    }
}
