//! Label, annotation and finalizer keys shared by the controller, routing and admission.

/// Label carrying the workspace id on every generated object; also the pod selector
pub const WORKSPACE_ID_LABEL: &str = "controller.devfile.io/workspace_id";

/// Label recording the UID of the user that created the workspace
pub const CREATOR_LABEL: &str = "controller.devfile.io/creator";

/// Marks a workspace (and auxiliary objects) as visible to the creator only
pub const RESTRICTED_ACCESS_ANNOTATION: &str = "controller.devfile.io/restricted-access";

/// UID of the last caller to modify the workspace, stamped at admission
pub const LAST_MODIFIED_BY_ANNOTATION: &str = "controller.devfile.io/last-modified-by";

/// Reason the workspace was last stopped
pub const STOPPED_BY_ANNOTATION: &str = "controller.devfile.io/stopped-by";

/// Endpoint name recorded on routes and ingresses so URLs can be mapped back
pub const ENDPOINT_NAME_ANNOTATION: &str = "controller.devfile.io/endpoint_name";

/// Finalizer guarding solver cleanup of cluster-scoped routing objects
pub const ROUTING_FINALIZER: &str = "controller.devfile.io/routing";

/// Routing class name for web terminals; also selects the default terminal container
pub const WEB_TERMINAL_ROUTING_CLASS: &str = "web-terminal";
