//! Readiness of the user-facing server inside a workspace.

use crate::error::ControllerError;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Checks whether the server behind a workspace URL is answering.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(&self, main_url: &str) -> bool;
}

/// Probe that GETs `<mainUrl>/healthz`.
///
/// Certificate verification is disabled: cluster-internal TLS uses the service CA,
/// which the controller does not trust.
#[derive(Debug, Clone)]
pub struct HttpReadinessProbe {
    client: reqwest::Client,
}

impl HttpReadinessProbe {
    pub fn new(timeout: Duration) -> Result<Self, ControllerError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .map_err(|e| ControllerError::Probe(e.to_string()))?;
        Ok(Self { client })
    }
}

/// An authenticating proxy answering 401/403 means the server behind it is up.
pub fn status_means_ready(status: StatusCode) -> bool {
    status.is_success()
        || status.is_redirection()
        || status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
}

fn health_url(main_url: &str) -> String {
    format!("{}/healthz", main_url.trim_end_matches('/'))
}

#[async_trait]
impl ReadinessProbe for HttpReadinessProbe {
    async fn is_ready(&self, main_url: &str) -> bool {
        let url = health_url(main_url);
        match self.client.get(&url).send().await {
            Ok(response) => {
                let ready = status_means_ready(response.status());
                debug!("Readiness probe {} returned {} (ready: {})", url, response.status(), ready);
                ready
            }
            Err(e) => {
                debug!("Readiness probe {} failed: {}", url, e);
                false
            }
        }
    }
}
