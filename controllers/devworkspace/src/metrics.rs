//! Prometheus metrics for reconciliation passes.

use crate::error::ControllerError;
use crds::WorkspacePhase;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::time::Duration;

/// Result label values for `devworkspace_reconcile_total`
pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_REQUEUE: &str = "requeue";
pub const RESULT_ERROR: &str = "error";

#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    reconcile_total: IntCounterVec,
    reconcile_duration: Histogram,
    phase_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();
        let reconcile_total = IntCounterVec::new(
            Opts::new("devworkspace_reconcile_total", "Reconciliation passes by result"),
            &["result"],
        )?;
        let reconcile_duration = Histogram::with_opts(HistogramOpts::new(
            "devworkspace_reconcile_duration_seconds",
            "Duration of reconciliation passes",
        ))?;
        let phase_transitions = IntCounterVec::new(
            Opts::new(
                "devworkspace_phase_transitions_total",
                "Workspace phase transitions by target phase",
            ),
            &["phase"],
        )?;
        registry.register(Box::new(reconcile_total.clone()))?;
        registry.register(Box::new(reconcile_duration.clone()))?;
        registry.register(Box::new(phase_transitions.clone()))?;
        Ok(Self {
            registry,
            reconcile_total,
            reconcile_duration,
            phase_transitions,
        })
    }

    pub fn record_reconcile(&self, result: &str, duration: Duration) {
        self.reconcile_total.with_label_values(&[result]).inc();
        self.reconcile_duration.observe(duration.as_secs_f64());
    }

    pub fn record_phase_transition(&self, phase: WorkspacePhase) {
        self.phase_transitions.with_label_values(&[phase.as_str()]).inc();
    }

    /// Text exposition of every registered metric
    pub fn encode(&self) -> Result<String, ControllerError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| ControllerError::Serialization(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| ControllerError::Serialization(e.to_string()))
    }

    #[cfg(test)]
    pub fn reconcile_count(&self, result: &str) -> u64 {
        self.reconcile_total.with_label_values(&[result]).get()
    }

    #[cfg(test)]
    pub fn phase_transition_count(&self, phase: WorkspacePhase) -> u64 {
        self.phase_transitions.with_label_values(&[phase.as_str()]).get()
    }
}
