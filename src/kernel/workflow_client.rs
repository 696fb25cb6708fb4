//! AI workflow engine client
//!
//! Simple HTTP client for starting workflow runs on the external engine.
//! The engine works asynchronously: a run is submitted here and the result
//! arrives later on the webhook route, correlated by generation job id.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::Config;

/// Client for submitting workflow runs via HTTP
#[derive(Clone)]
pub struct WorkflowClient {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

/// Acknowledgement returned by the engine on submission.
#[derive(Debug, Deserialize)]
pub struct WorkflowRun {
    #[serde(default, alias = "run_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl WorkflowClient {
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.workflow_engine_url.trim_end_matches('/').to_string(),
            api_key: config.workflow_api_key.clone(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Start a workflow run without waiting for completion (fire-and-forget).
    pub async fn run_workflow(
        &self,
        workflow_id: &str,
        run_title: &str,
        payload: &serde_json::Value,
    ) -> Result<WorkflowRun> {
        let url = format!(
            "{}/api/workflow/run?workflow_id={}&workflow_run_title={}",
            self.base_url, workflow_id, run_title
        );

        tracing::debug!(workflow_id, url = %url, "Submitting workflow run");

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(payload)
            .send()
            .await
            .context("Failed to send workflow request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            anyhow::bail!("Workflow engine error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to deserialize workflow response")
    }
}
