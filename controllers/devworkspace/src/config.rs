//! Controller configuration.
//!
//! Loaded once from environment variables in `main`, completed with the probed cluster
//! capability and then shared read-only with every reconciliation pass.

use crate::error::ControllerError;
use crds::{Component, ContainerComponent, EnvVar};
use routing::{RoutingClass, SolverConfig};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

pub const DEFAULT_OAUTH_PROXY_IMAGE: &str = "quay.io/openshift/origin-oauth-proxy:4.7";
pub const DEFAULT_WEB_TERMINAL_TOOLING_IMAGE: &str = "quay.io/wto/web-terminal-tooling:latest";

/// Name of the container injected into web terminals that declare none
pub const DEFAULT_TERMINAL_COMPONENT_NAME: &str = "dev";

/// Immutable configuration snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Routing class used when a workspace leaves `routingClass` empty
    pub default_routing_class: RoutingClass,
    /// Domain appended to endpoint host names
    pub routing_suffix: Option<String>,
    /// Admission webhooks are deployed; required for restricted-access workspaces
    pub webhooks_enabled: bool,
    /// Stamp startup stage times onto workspaces as annotations
    pub timing_enabled: bool,
    pub idle_timeout: String,
    pub pvc_size: String,
    pub pvc_storage_class: Option<String>,
    pub oauth_proxy_image: String,
    pub web_terminal_tooling_image: String,
    /// Override for the container injected into web terminals
    pub default_terminal_component: Option<ContainerComponent>,
    pub readiness_poll_attempts: u32,
    pub readiness_poll_interval: Duration,
    /// Delay for steps that are waiting on the cluster
    pub requeue_interval: Duration,
    /// Listen address of the metrics, health and admission server
    pub metrics_addr: SocketAddr,
    /// Overrides the OpenShift capability probe when set
    pub force_openshift: Option<bool>,
    /// Cluster serves OpenShift routes; filled in by [`ControllerConfig::with_openshift`]
    pub is_openshift: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            watch_namespace: None,
            default_routing_class: RoutingClass::Basic,
            routing_suffix: None,
            webhooks_enabled: false,
            timing_enabled: false,
            idle_timeout: "15m".to_string(),
            pvc_size: "1Gi".to_string(),
            pvc_storage_class: None,
            oauth_proxy_image: DEFAULT_OAUTH_PROXY_IMAGE.to_string(),
            web_terminal_tooling_image: DEFAULT_WEB_TERMINAL_TOOLING_IMAGE.to_string(),
            default_terminal_component: None,
            readiness_poll_attempts: 3,
            readiness_poll_interval: Duration::from_millis(500),
            requeue_interval: Duration::from_secs(5),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            force_openshift: None,
            is_openshift: false,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ControllerError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ControllerError::InvalidConfig(format!(
            "{key} must be true or false, got {value:?}"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ControllerError> {
    value.trim().parse().map_err(|_| {
        ControllerError::InvalidConfig(format!(
            "{key} must be a non-negative integer, got {value:?}"
        ))
    })
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        config.watch_namespace = get("WATCH_NAMESPACE");
        if let Some(class) = get("DEFAULT_ROUTING_CLASS") {
            config.default_routing_class = class.parse().map_err(|_| {
                ControllerError::InvalidConfig(format!(
                    "DEFAULT_ROUTING_CLASS {class:?} is not a supported routing class"
                ))
            })?;
        }
        config.routing_suffix = get("ROUTING_SUFFIX");
        if let Some(value) = get("WEBHOOKS_ENABLED") {
            config.webhooks_enabled = parse_bool("WEBHOOKS_ENABLED", &value)?;
        }
        if let Some(value) = get("ENABLE_STARTUP_TIMING") {
            config.timing_enabled = parse_bool("ENABLE_STARTUP_TIMING", &value)?;
        }
        if let Some(value) = get("WORKSPACE_IDLE_TIMEOUT") {
            config.idle_timeout = value;
        }
        if let Some(value) = get("WORKSPACE_PVC_SIZE") {
            config.pvc_size = value;
        }
        config.pvc_storage_class = get("WORKSPACE_PVC_STORAGE_CLASS");
        if let Some(value) = get("OAUTH_PROXY_IMAGE") {
            config.oauth_proxy_image = value;
        }
        if let Some(value) = get("WEB_TERMINAL_TOOLING_IMAGE") {
            config.web_terminal_tooling_image = value;
        }
        if let Some(yaml) = get("DEFAULT_TERMINAL_COMPONENT") {
            let component: ContainerComponent = serde_yaml::from_str(&yaml).map_err(|e| {
                ControllerError::InvalidConfig(format!(
                    "DEFAULT_TERMINAL_COMPONENT is not a valid container component: {e}"
                ))
            })?;
            config.default_terminal_component = Some(component);
        }
        if let Some(value) = get("READINESS_POLL_ATTEMPTS") {
            config.readiness_poll_attempts = parse_number("READINESS_POLL_ATTEMPTS", &value)?;
        }
        if let Some(value) = get("READINESS_POLL_INTERVAL_MS") {
            let millis = parse_number("READINESS_POLL_INTERVAL_MS", &value)?;
            config.readiness_poll_interval = Duration::from_millis(millis);
        }
        if let Some(value) = get("REQUEUE_INTERVAL_SECS") {
            let secs = parse_number("REQUEUE_INTERVAL_SECS", &value)?;
            config.requeue_interval = Duration::from_secs(secs);
        }
        if let Some(value) = get("METRICS_ADDR") {
            config.metrics_addr = value.parse().map_err(|_| {
                ControllerError::InvalidConfig(format!(
                    "METRICS_ADDR {value:?} is not a socket address"
                ))
            })?;
        }
        if let Some(value) = get("FORCE_OPENSHIFT") {
            config.force_openshift = Some(parse_bool("FORCE_OPENSHIFT", &value)?);
        }
        Ok(config)
    }

    /// Record the cluster capability, honouring `FORCE_OPENSHIFT`
    #[must_use]
    pub fn with_openshift(mut self, probed: bool) -> Self {
        self.is_openshift = self.force_openshift.unwrap_or(probed);
        self
    }

    /// Check settings that depend on the cluster capability
    pub fn validate(&self) -> Result<(), ControllerError> {
        if self.default_routing_class.requires_openshift() && !self.is_openshift {
            return Err(ControllerError::InvalidConfig(format!(
                "default routing class {} requires OpenShift",
                self.default_routing_class
            )));
        }
        if !self.is_openshift && self.routing_suffix.is_none() {
            return Err(ControllerError::InvalidConfig(
                "ROUTING_SUFFIX must be set when not running on OpenShift".to_string(),
            ));
        }
        if self.readiness_poll_attempts == 0 {
            return Err(ControllerError::InvalidConfig(
                "READINESS_POLL_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn solver_config(&self) -> SolverConfig {
        SolverConfig {
            is_openshift: self.is_openshift,
            oauth_proxy_image: self.oauth_proxy_image.clone(),
        }
    }

    /// Container injected into web terminals whose template declares none
    pub fn default_terminal_component(&self) -> Component {
        let container = self
            .default_terminal_component
            .clone()
            .unwrap_or_else(|| ContainerComponent {
                image: self.web_terminal_tooling_image.clone(),
                memory_limit: Some("256Mi".to_string()),
                args: vec!["tail".to_string(), "-f".to_string(), "/dev/null".to_string()],
                env: vec![EnvVar {
                    name: "PS1".to_string(),
                    value: r"\[\e[34m\]>\[\e[m\]\[\e[33m\]>\[\e[m\]".to_string(),
                }],
                ..Default::default()
            });
        Component {
            name: DEFAULT_TERMINAL_COMPONENT_NAME.to_string(),
            container: Some(container),
            ..Default::default()
        }
    }

    pub fn log_summary(&self) {
        info!("Configuration:");
        info!("  Namespace: {}", self.watch_namespace.as_deref().unwrap_or("all namespaces"));
        info!("  OpenShift: {}", self.is_openshift);
        info!("  Default routing class: {}", self.default_routing_class);
        info!("  Routing suffix: {}", self.routing_suffix.as_deref().unwrap_or("<none>"));
        info!("  Webhooks enabled: {}", self.webhooks_enabled);
        info!("  Startup timing: {}", self.timing_enabled);
        info!("  Listen address: {}", self.metrics_addr);
    }
}
