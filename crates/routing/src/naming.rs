//! Object naming shared by the controller and every solver.
//!
//! Generated objects address each other by name (routes target services, the deployment
//! mounts the service account), so every name is derived here from the workspace id.

/// Maximum length of a DNS label
const MAX_LABEL_LENGTH: usize = 63;

/// Maximum length of a service or container port name
const MAX_PORT_NAME_LENGTH: usize = 15;

/// Claim shared by all workspaces in a namespace
pub const COMMON_PVC_NAME: &str = "claim-devworkspace";

/// Role granting `pods/exec` to workspace service accounts
pub const WORKSPACE_ROLE_NAME: &str = "workspace";

/// Binding of the `view` cluster role
pub const VIEW_ROLE_BINDING_NAME: &str = "workspace-view";

/// Binding of the exec role
pub const EXEC_ROLE_BINDING_NAME: &str = "workspace-exec";

/// Lowercase an endpoint name and replace anything that is not alphanumeric with `-`
pub fn endpoint_name(name: &str) -> String {
    let sanitized: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    sanitized.trim_matches('-').to_string()
}

/// Endpoint name cut down to a valid port name
pub fn port_name(name: &str) -> String {
    let mut name = endpoint_name(name);
    name.truncate(MAX_PORT_NAME_LENGTH);
    name.trim_end_matches('-').to_string()
}

pub fn deployment_name(workspace_id: &str) -> String {
    workspace_id.to_string()
}

pub fn service_name(workspace_id: &str) -> String {
    format!("{workspace_id}-service")
}

/// Name of the route or ingress exposing one endpoint
pub fn route_name(workspace_id: &str, endpoint_name: &str) -> String {
    format!("{workspace_id}-{endpoint_name}")
}

pub fn service_account_name(workspace_id: &str) -> String {
    format!("{workspace_id}-sa")
}

pub fn oauth_client_name(workspace_id: &str) -> String {
    format!("{workspace_id}-oauth-client")
}

/// Secret populated by the OpenShift service CA for serving-cert annotated services
pub fn serving_cert_secret_name(workspace_id: &str) -> String {
    format!("{workspace_id}-serving-cert")
}

/// Host name for an endpoint: `<id>-<endpoint>-<port>` (one DNS label) under the routing suffix.
///
/// Returns `None` without a routing suffix; on OpenShift the router then assigns the host.
pub fn endpoint_hostname(
    workspace_id: &str,
    endpoint_name: &str,
    port: i32,
    routing_suffix: Option<&str>,
) -> Option<String> {
    let suffix = routing_suffix.filter(|s| !s.is_empty())?;
    let mut hostname = format!("{workspace_id}-{endpoint_name}-{port}");
    if hostname.len() > MAX_LABEL_LENGTH {
        hostname.truncate(MAX_LABEL_LENGTH);
        hostname = hostname.trim_end_matches('-').to_string();
    }
    Some(format!("{hostname}.{suffix}"))
}
