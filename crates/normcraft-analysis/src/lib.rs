//! Submission of a norm set to the conformance analysis service.
//!
//! One run at a time: [`AnalysisRunner::run`] refuses to start while another
//! run is in flight, and publishes its progress on a watch channel so callers
//! can keep editing while it completes.

pub mod engine;
pub mod query;

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use normcraft_core::{CreatedNorm, EditorSession, GlobalProcessConfig};

pub use engine::{HttpTransport, Transport, DEFAULT_ENDPOINT};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    pub config: GlobalProcessConfig,
    pub norms: Vec<CreatedNorm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

impl AnalysisRequest {
    pub fn new(config: GlobalProcessConfig, norms: Vec<CreatedNorm>) -> Self {
        Self {
            config,
            norms,
            run_type: None,
            schedule: None,
        }
    }

    /// Request for the session's configuration and its enabled norms.
    pub fn from_session(session: &EditorSession) -> Self {
        Self::new(session.config().clone(), session.enabled_norms())
    }
}

/// Reply body. Results are opaque to this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnalysisResponse {
    Results { results: Value },
    Failure { detail: Value },
}

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("an analysis run is already in progress")]
    AlreadyRunning,
    #[error("could not reach the analysis service: {0}")]
    Transport(String),
    #[error("analysis failed: {0}")]
    Service(String),
    #[error("unexpected response from the analysis service: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AnalysisStatus {
    #[default]
    Idle,
    Running,
    Succeeded {
        results: Value,
    },
    Failed {
        message: String,
    },
}

pub struct AnalysisRunner {
    transport: Box<dyn Transport>,
    in_flight: AtomicBool,
    status: watch::Sender<AnalysisStatus>,
}

/// Clears the in-flight flag when a run ends, including on early return.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl AnalysisRunner {
    pub fn new(transport: impl Transport + 'static) -> Self {
        let (status, _) = watch::channel(AnalysisStatus::Idle);
        Self {
            transport: Box::new(transport),
            in_flight: AtomicBool::new(false),
            status,
        }
    }

    /// Runner posting over HTTP to the endpoint named by the environment.
    pub fn from_env() -> Self {
        Self::new(HttpTransport::from_env())
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn status(&self) -> AnalysisStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisStatus> {
        self.status.subscribe()
    }

    /// Submit `request` and wait for the reply.
    ///
    /// Returns `AlreadyRunning` without sending anything if a run is in flight.
    pub async fn run(&self, request: &AnalysisRequest) -> Result<Value, AnalysisError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(AnalysisError::AlreadyRunning);
        }
        let _guard = InFlight(&self.in_flight);

        self.status.send_replace(AnalysisStatus::Running);
        tracing::info!(norms = request.norms.len(), "submitting analysis");

        let outcome = match self.transport.submit(request).await {
            Ok(AnalysisResponse::Results { results }) => Ok(results),
            Ok(AnalysisResponse::Failure { detail }) => {
                Err(AnalysisError::Service(detail_message(&detail)))
            }
            Err(e) => Err(e),
        };

        match &outcome {
            Ok(results) => {
                tracing::info!("analysis finished");
                self.status.send_replace(AnalysisStatus::Succeeded {
                    results: results.clone(),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "analysis failed");
                self.status.send_replace(AnalysisStatus::Failed {
                    message: e.to_string(),
                });
            }
        }
        outcome
    }
}

fn detail_message(detail: &Value) -> String {
    match detail {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
