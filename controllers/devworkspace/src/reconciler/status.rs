//! Status accumulated during a pass and written once at its end.

use chrono::{DateTime, Utc};
use cluster_client::{ClusterClient, ClusterError};
use crds::{ConditionType, DevWorkspaceStatus, WorkspaceCondition, WorkspacePhase};
use std::collections::BTreeMap;
use tracing::debug;

const CONDITION_TRUE: &str = "True";
const CONDITION_FALSE: &str = "False";

#[derive(Debug, Clone, PartialEq, Eq)]
struct ConditionState {
    ready: bool,
    message: Option<String>,
}

/// Mutable view of the workspace status for one reconciliation pass.
///
/// Steps never touch it; the reconciler records each step's outcome here and the
/// result is written in a single update however the pass ends.
#[derive(Debug, Clone, Default)]
pub struct PassStatus {
    pub workspace_id: Option<String>,
    pub phase: Option<WorkspacePhase>,
    pub main_url: Option<String>,
    pub message: Option<String>,
    conditions: BTreeMap<ConditionType, ConditionState>,
}

impl PassStatus {
    /// Start from the persisted status
    pub fn from_status(status: &DevWorkspaceStatus) -> Self {
        Self {
            workspace_id: status.workspace_id.clone(),
            phase: status.phase,
            main_url: status.main_url.clone(),
            message: status.message.clone(),
            conditions: status
                .conditions
                .iter()
                .map(|c| {
                    (
                        c.condition_type,
                        ConditionState {
                            ready: c.status == CONDITION_TRUE,
                            message: c.message.clone(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn set_condition(
        &mut self,
        condition_type: ConditionType,
        ready: bool,
        message: Option<String>,
    ) {
        self.conditions.insert(condition_type, ConditionState { ready, message });
    }

    pub fn clear_conditions(&mut self) {
        self.conditions.clear();
    }

    /// Move to `Failed` with `message` recorded on the `FailedStart` condition
    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.phase = Some(WorkspacePhase::Failed);
        self.set_condition(ConditionType::FailedStart, true, Some(message.clone()));
        self.message = Some(message);
    }

    /// Build the status to persist.
    ///
    /// A condition keeps its previous transition time unless its status flipped.
    pub fn build(&self, previous: &DevWorkspaceStatus, now: DateTime<Utc>) -> DevWorkspaceStatus {
        let conditions = self
            .conditions
            .iter()
            .map(|(condition_type, state)| {
                let status = if state.ready { CONDITION_TRUE } else { CONDITION_FALSE };
                let last_transition_time = previous
                    .condition(*condition_type)
                    .filter(|c| c.status == status)
                    .and_then(|c| c.last_transition_time)
                    .unwrap_or(now);
                WorkspaceCondition {
                    condition_type: *condition_type,
                    status: status.to_string(),
                    message: state.message.clone(),
                    last_transition_time: Some(last_transition_time),
                }
            })
            .collect();

        DevWorkspaceStatus {
            workspace_id: self.workspace_id.clone(),
            phase: self.phase,
            conditions,
            main_url: self.main_url.clone(),
            message: self.message.clone(),
        }
    }
}

/// Persist `next` unless it equals `previous`. Returns whether a write happened.
pub async fn write_status(
    client: &dyn ClusterClient,
    namespace: &str,
    name: &str,
    previous: &DevWorkspaceStatus,
    next: &DevWorkspaceStatus,
) -> Result<bool, ClusterError> {
    if previous == next {
        debug!("Status of DevWorkspace {}/{} unchanged", namespace, name);
        return Ok(false);
    }
    client.patch_workspace_status(namespace, name, next).await?;
    Ok(true)
}
