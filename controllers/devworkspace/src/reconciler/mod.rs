//! Reconciliation logic for DevWorkspaces.
//!
//! Each pass rebuilds the next action from the declared workspace and the live cluster
//! objects alone:
//! - `stop`: scale-down sub-machine for stopped workspaces
//! - `finalize`: routing cleanup for workspaces being deleted
//! - `status`: the status accumulated during a pass and written once at its end
//! - `timing`: opt-in startup stage annotations
//!
//! Provisioning runs the steps in `crate::provision` in a fixed order and stops at the
//! first one that is not complete.

pub mod finalize;
pub mod status;
pub mod stop;
pub mod timing;

#[cfg(test)]
mod reconcile_test;

use crate::backoff::FibonacciBackoff;
use crate::config::ControllerConfig;
use crate::devfile::{BuiltinPluginResolver, PluginResolver};
use crate::error::ControllerError;
use crate::metrics::{Metrics, RESULT_ERROR, RESULT_REQUEUE, RESULT_SUCCESS};
use crate::provision::{self, Blocked};
use crate::readiness::ReadinessProbe;
use chrono::Utc;
use cluster_client::ClusterClient;
use crds::{
    ConditionType, DevWorkspace, DevWorkspaceStatus, STOPPED_BY_ANNOTATION, WorkspacePhase,
};
use futures::FutureExt;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use routing::{SolverRegistry, WorkspaceMetadata};
use status::{PassStatus, write_status};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use timing::{Stage, StartupTiming, sync_timing};
use tracing::{debug, error, info, warn};

/// Delay before re-checking a workspace whose server is not answering yet
const READINESS_RETRY: Duration = Duration::from_secs(1);

/// What the scheduler should do after a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing to do until the workspace or an owned object changes
    Done,
    /// Retry after the configured requeue interval
    Requeue,
    RequeueAfter(Duration),
    /// Retry immediately; used after writes to the workspace itself
    RequeueNow,
}

impl ReconcileOutcome {
    pub fn to_action(self, requeue_interval: Duration) -> Action {
        match self {
            ReconcileOutcome::Done => Action::await_change(),
            ReconcileOutcome::Requeue => Action::requeue(requeue_interval),
            ReconcileOutcome::RequeueAfter(delay) => Action::requeue(delay),
            ReconcileOutcome::RequeueNow => Action::requeue(Duration::ZERO),
        }
    }

    fn metric_result(self) -> &'static str {
        match self {
            ReconcileOutcome::Done => RESULT_SUCCESS,
            _ => RESULT_REQUEUE,
        }
    }
}

/// Derive the workspace id from the resource UID: `workspace` followed by the first
/// three groups of the UUID.
pub fn workspace_id(uid: &str) -> Result<String, ControllerError> {
    let parsed = uuid::Uuid::parse_str(uid).map_err(|e| {
        ControllerError::InvalidWorkspace(format!("uid {uid:?} is not a UUID: {e}"))
    })?;
    let hyphenated = parsed.hyphenated().to_string();
    let prefix: String = hyphenated.split('-').take(3).collect();
    Ok(format!("workspace{prefix}"))
}

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 300), // 1 second min, 5 minutes max
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }

    fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Reconciles DevWorkspaces.
pub struct Reconciler {
    pub(crate) client: Box<dyn ClusterClient>,
    pub(crate) config: Arc<ControllerConfig>,
    pub(crate) registry: SolverRegistry,
    pub(crate) plugins: Box<dyn PluginResolver>,
    pub(crate) probe: Arc<dyn ReadinessProbe>,
    pub(crate) metrics: Arc<Metrics>,
    /// Error count tracking per resource (namespace/name -> BackoffState)
    backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        client: impl ClusterClient + 'static,
        config: Arc<ControllerConfig>,
        probe: Arc<dyn ReadinessProbe>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let registry = SolverRegistry::new(config.default_routing_class, config.solver_config());
        Self {
            client: Box::new(client),
            config,
            registry,
            plugins: Box::new(BuiltinPluginResolver),
            probe,
            metrics,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run one reconciliation pass for `namespace/name` and record its metrics.
    pub async fn reconcile_workspace(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let start = Instant::now();
        let result = self.reconcile_inner(namespace, name).await;
        let label = match &result {
            Ok(outcome) => outcome.metric_result(),
            Err(_) => RESULT_ERROR,
        };
        self.metrics.record_reconcile(label, start.elapsed());
        result
    }

    async fn reconcile_inner(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ControllerError> {
        info!("Reconciling DevWorkspace {}/{}", namespace, name);

        let Some(workspace) = self.client.get_workspace(namespace, name).await? else {
            debug!("DevWorkspace {}/{} no longer exists", namespace, name);
            return Ok(ReconcileOutcome::Done);
        };

        if workspace.metadata.deletion_timestamp.is_some() {
            return finalize::finalize_workspace(
                self.client.as_ref(),
                &self.registry,
                self.config.routing_suffix.clone(),
                &workspace,
            )
            .await;
        }

        let previous = workspace.status.clone().unwrap_or_default();
        let Some(id) = workspace.workspace_id().map(str::to_string) else {
            let uid = workspace.uid().ok_or_else(|| {
                ControllerError::InvalidWorkspace(format!(
                    "DevWorkspace {namespace}/{name} has no uid"
                ))
            })?;
            let status = DevWorkspaceStatus {
                workspace_id: Some(workspace_id(&uid)?),
                ..previous
            };
            self.client.patch_workspace_status(namespace, name, &status).await?;
            info!(
                "Assigned workspace id {} to DevWorkspace {}/{}",
                status.workspace_id.as_deref().unwrap_or_default(),
                namespace,
                name
            );
            return Ok(ReconcileOutcome::RequeueNow);
        };

        let mut pass = PassStatus::from_status(&previous);
        let mut timing = StartupTiming::new(self.config.timing_enabled, &workspace);
        let result = AssertUnwindSafe(self.run_pass(&workspace, &id, &mut pass, &mut timing))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(
                    "Reconciliation of DevWorkspace {}/{} panicked: {}",
                    namespace, name, message
                );
                Err(ControllerError::Panicked(message))
            });

        // Written on every exit path of the pass, including errors and panics
        sync_timing(self.client.as_ref(), &workspace, &timing).await;
        let next = pass.build(&previous, Utc::now());
        let written = write_status(self.client.as_ref(), namespace, name, &previous, &next).await;
        if let (Some(phase), true) = (next.phase, next.phase != previous.phase) {
            info!(
                "DevWorkspace {}/{} phase {} -> {}",
                namespace,
                name,
                previous.phase.map_or("<none>", |p| p.as_str()),
                phase
            );
            self.metrics.record_phase_transition(phase);
        }

        let outcome = result?;
        written?;
        Ok(outcome)
    }

    /// Validation and provisioning for a workspace with a persisted id
    async fn run_pass(
        &self,
        workspace: &DevWorkspace,
        id: &str,
        pass: &mut PassStatus,
        timing: &mut StartupTiming,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let namespace = workspace.namespace().unwrap_or_default();

        if !workspace.spec.started {
            timing.clear();
            let phase = stop::stop_workspace(self.client.as_ref(), &namespace, id).await?;
            pass.phase = Some(phase);
            pass.message = None;
            pass.clear_conditions();
            return Ok(match phase {
                WorkspacePhase::Stopped => ReconcileOutcome::Done,
                _ => ReconcileOutcome::Requeue,
            });
        }

        if pass.phase == Some(WorkspacePhase::Failed) {
            debug!(
                "DevWorkspace {} has failed; waiting for it to be stopped",
                workspace.name_any()
            );
            return Ok(ReconcileOutcome::Done);
        }

        if let Err(message) = self.validate(workspace) {
            warn!("DevWorkspace {} is invalid: {}", workspace.name_any(), message);
            pass.fail(message);
            return Ok(ReconcileOutcome::Done);
        }

        if workspace.stopped_by().is_some() {
            let mut updated = workspace.clone();
            updated.annotations_mut().remove(STOPPED_BY_ANNOTATION);
            return match self.client.replace_workspace(&updated).await {
                Ok(_) => Ok(ReconcileOutcome::RequeueNow),
                Err(e) if e.is_conflict() => Ok(ReconcileOutcome::Requeue),
                Err(e) => Err(e.into()),
            };
        }

        if pass.phase != Some(WorkspacePhase::Running) {
            pass.phase = Some(WorkspacePhase::Starting);
        }
        timing.record(Stage::WorkspaceStarted, Utc::now());
        self.provision(workspace, id, &namespace, pass, timing).await
    }

    /// Identity checks that must hold before anything is provisioned
    fn validate(&self, workspace: &DevWorkspace) -> Result<(), String> {
        let Some(creator) = workspace.creator() else {
            return Err("DevWorkspace is missing the creator label".to_string());
        };
        if workspace.is_restricted_access() {
            if !self.config.webhooks_enabled {
                return Err(
                    "restricted-access DevWorkspaces require admission webhooks to be enabled"
                        .to_string(),
                );
            }
            if let Some(modifier) = workspace.last_modified_by() {
                if modifier != creator {
                    return Err(format!(
                        "restricted-access DevWorkspace was modified by {modifier}, not its creator"
                    ));
                }
            }
        }
        Ok(())
    }

    /// Record a blocked step and choose the pass outcome
    fn blocked(
        &self,
        pass: &mut PassStatus,
        condition: Option<ConditionType>,
        blocked: Blocked,
    ) -> Result<ReconcileOutcome, ControllerError> {
        match blocked {
            Blocked::Requeue(message) => {
                let step = condition.map_or("provisioning".to_string(), |c| format!("{c:?}"));
                info!("Waiting on {}: {}", step, message);
                if let Some(condition) = condition {
                    pass.set_condition(condition, false, Some(message.clone()));
                }
                pass.message = Some(message);
                Ok(ReconcileOutcome::Requeue)
            }
            Blocked::FailStartup(message) => {
                warn!("Workspace failed to start: {}", message);
                if let Some(condition) = condition {
                    pass.set_condition(condition, false, Some(message.clone()));
                }
                pass.fail(message);
                Ok(ReconcileOutcome::Done)
            }
            Blocked::Error(err) => Err(err),
        }
    }

    async fn provision(
        &self,
        workspace: &DevWorkspace,
        id: &str,
        namespace: &str,
        pass: &mut PassStatus,
        timing: &mut StartupTiming,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let client = self.client.as_ref();
        let meta = WorkspaceMetadata::new(id, namespace, self.config.routing_suffix.clone());

        timing.record(Stage::ComponentsCreated, Utc::now());
        let plugins = self.plugins.as_ref();
        let components =
            match provision::components::resolve_components(workspace, id, &self.config, plugins) {
                Ok(components) => components,
                Err(b) => return self.blocked(pass, Some(ConditionType::ComponentsReady), b),
            };
        pass.set_condition(ConditionType::ComponentsReady, true, None);
        timing.record(Stage::ComponentsReady, Utc::now());

        let storage =
            provision::storage::sync_storage(client, namespace, &components, &self.config).await;
        if let Err(b) = storage {
            return self.blocked(pass, Some(ConditionType::StorageReady), b);
        }
        pass.set_condition(ConditionType::StorageReady, true, None);

        if let Err(b) = provision::rbac::sync_rbac(client, namespace).await {
            return self.blocked(pass, None, b);
        }

        timing.record(Stage::RoutingCreated, Utc::now());
        let routing = provision::routing::sync_routing(
            client,
            &self.registry,
            workspace,
            &meta,
            &components,
        )
        .await;
        let routing = match routing {
            Ok(routing) => routing,
            Err(b) => return self.blocked(pass, Some(ConditionType::RoutingReady), b),
        };
        pass.set_condition(ConditionType::RoutingReady, true, None);
        timing.record(Stage::RoutingReady, Utc::now());
        if routing.main_url.is_some() {
            pass.main_url = routing.main_url.clone();
        }

        let service_account = match provision::service_account::sync_service_account(
            client,
            workspace,
            &meta,
            &routing.service_account_annotations,
        )
        .await
        {
            Ok(name) => name,
            Err(b) => return self.blocked(pass, Some(ConditionType::ServiceAccountReady), b),
        };
        pass.set_condition(ConditionType::ServiceAccountReady, true, None);

        timing.record(Stage::DeploymentCreated, Utc::now());
        let needs_storage = provision::storage::needs_storage(&components);
        let merged = provision::deployment::merge_pod_additions(
            &components,
            routing.pod_additions.as_ref(),
            needs_storage,
        );
        let deployment = match merged {
            Ok(pod_spec) => {
                provision::deployment::sync_deployment(
                    client,
                    workspace,
                    &meta,
                    pod_spec,
                    &service_account,
                )
                .await
            }
            Err(b) => Err(b),
        };
        if let Err(b) = deployment {
            return self.blocked(pass, Some(ConditionType::DeploymentReady), b);
        }
        pass.set_condition(ConditionType::DeploymentReady, true, None);
        timing.record(Stage::DeploymentReady, Utc::now());

        match routing.main_url.as_deref() {
            Some(url) if !self.wait_until_ready(url).await => {
                pass.message = Some("Waiting for workspace server to start".to_string());
                Ok(ReconcileOutcome::RequeueAfter(READINESS_RETRY))
            }
            _ => {
                timing.record(Stage::WorkspaceReady, Utc::now());
                timing.summarize();
                pass.phase = Some(WorkspacePhase::Running);
                pass.message = None;
                Ok(ReconcileOutcome::Done)
            }
        }
    }

    /// Bounded poll of the readiness probe
    async fn wait_until_ready(&self, main_url: &str) -> bool {
        for attempt in 1..=self.config.readiness_poll_attempts {
            if self.probe.is_ready(main_url).await {
                return true;
            }
            if attempt < self.config.readiness_poll_attempts {
                tokio::time::sleep(self.config.readiness_poll_interval).await;
            }
        }
        debug!(
            "{} is not ready after {} attempts",
            main_url, self.config.readiness_poll_attempts
        );
        false
    }

    /// Get backoff for a resource based on its error count
    pub fn get_backoff_for_resource(&self, resource_key: &str) -> (Duration, u32) {
        match self.backoff_states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(BackoffState::new);
                (state.backoff.next_backoff(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff_states: {}, using default backoff", e);
                (Duration::from_secs(60), 0)
            }
        }
    }

    /// Increment error count for a resource
    pub fn increment_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::new)
                .increment_error();
        }
    }

    /// Reset error count for a resource (on successful reconciliation)
    pub fn reset_error(&self, resource_key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(resource_key) {
                state.reset();
            }
        }
    }
}
