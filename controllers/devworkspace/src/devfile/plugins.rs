//! Plugin references resolved to container components.

use crds::{ContainerComponent, Endpoint};
use std::collections::BTreeMap;

/// Id of the built-in web terminal plugin
pub const WEB_TERMINAL_PLUGIN_ID: &str = "redhat-developer/web-terminal/latest";

const MACHINE_EXEC_IMAGE: &str = "quay.io/eclipse/che-machine-exec:nightly";
const MACHINE_EXEC_PORT: i32 = 4444;

/// Looks up plugin components by id
pub trait PluginResolver: Send + Sync {
    /// `None` when the plugin is unknown
    fn resolve(&self, id: &str) -> Option<ContainerComponent>;
}

/// Plugins shipped with the controller
#[derive(Debug, Clone, Default)]
pub struct BuiltinPluginResolver;

fn web_terminal() -> ContainerComponent {
    ContainerComponent {
        image: MACHINE_EXEC_IMAGE.to_string(),
        memory_limit: Some("128Mi".to_string()),
        mount_sources: Some(false),
        command: vec![
            "/go/bin/che-machine-exec".to_string(),
            "--url".to_string(),
            format!("0.0.0.0:{MACHINE_EXEC_PORT}"),
        ],
        endpoints: vec![Endpoint {
            name: "web-terminal".to_string(),
            target_port: MACHINE_EXEC_PORT,
            path: None,
            attributes: BTreeMap::from([
                ("public".to_string(), "true".to_string()),
                ("type".to_string(), "main".to_string()),
            ]),
        }],
        ..Default::default()
    }
}

impl PluginResolver for BuiltinPluginResolver {
    fn resolve(&self, id: &str) -> Option<ContainerComponent> {
        match id {
            WEB_TERMINAL_PLUGIN_ID => Some(web_terminal()),
            _ => None,
        }
    }
}
