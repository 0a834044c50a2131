use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use super::metrics::MetricsSnapshot;
use crate::config::BackendConfig;
use crate::errors::AgentError;
use crate::models::FindingRecord;

/// Where telemetry goes. The backend's own contract is opaque to the agent.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn send_metrics(&self, snapshot: &MetricsSnapshot) -> Result<(), AgentError>;

    async fn send_findings(&self, findings: &[FindingRecord]) -> Result<(), AgentError>;

    /// Ask the backend for new hosts to scan.
    async fn request_targets(&self, active_scan_count: usize) -> Result<Vec<String>, AgentError>;
}

pub struct HttpBackend {
    client: Client,
    base_url: String,
    docker_type: u32,
}

#[derive(Deserialize)]
struct TargetResponse {
    #[serde(default)]
    success: bool,
    data: Option<TargetData>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct TargetData {
    targets: Option<Vec<String>>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AgentError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            docker_type: config.docker_type,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<reqwest::Response, AgentError> {
        let resp = self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| AgentError::Network(format!("POST {} failed: {}", path, e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::Backend(format!("POST {} returned {}: {}", path, status, text)));
        }
        Ok(resp)
    }
}

#[async_trait]
impl TelemetrySink for HttpBackend {
    async fn send_metrics(&self, snapshot: &MetricsSnapshot) -> Result<(), AgentError> {
        self.post_json("/telemetry/save", snapshot).await?;
        debug!("Telemetry delivered");
        Ok(())
    }

    async fn send_findings(&self, findings: &[FindingRecord]) -> Result<(), AgentError> {
        self.post_json("/scan_results/openvas/save", findings).await?;
        info!(count = findings.len(), "Scan results delivered");
        Ok(())
    }

    async fn request_targets(&self, active_scan_count: usize) -> Result<Vec<String>, AgentError> {
        let body = json!({
            "total_running_scan_count": active_scan_count,
            "docker_type": self.docker_type,
        });
        let resp = self.post_json("/target", &body).await?;
        let parsed: TargetResponse = resp
            .json()
            .await
            .map_err(|e| AgentError::Backend(format!("Invalid target response: {}", e)))?;

        if !parsed.success {
            info!(message = parsed.message.as_deref().unwrap_or(""), "Backend has no targets");
            return Ok(Vec::new());
        }
        Ok(parsed.data.and_then(|d| d.targets).unwrap_or_default())
    }
}
