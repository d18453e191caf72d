use async_trait::async_trait;

use crate::{AnalysisError, AnalysisRequest, AnalysisResponse};

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/api/run-analysis";

/// Delivers an analysis request and returns the service's reply.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn submit(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError>;
}

/// JSON over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }

    /// Endpoint from `NORMCRAFT_ANALYSIS_URL`, else the local default.
    pub fn from_env() -> Self {
        let endpoint = std::env::var("NORMCRAFT_ANALYSIS_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        Self::new(endpoint)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, AnalysisError> {
        tracing::debug!(endpoint = %self.endpoint, "posting analysis request");
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;

        match serde_json::from_str::<AnalysisResponse>(&body) {
            Ok(parsed) => Ok(parsed),
            Err(_) if !status.is_success() => {
                Err(AnalysisError::Service(format!("HTTP {status}: {}", body.trim())))
            }
            Err(e) => Err(AnalysisError::Decode(e.to_string())),
        }
    }
}
