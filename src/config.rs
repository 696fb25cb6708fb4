use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Default base URL for the hosted workflow engine.
pub const DEFAULT_WORKFLOW_ENGINE_URL: &str = "https://api-v3.mindpal.io";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub workflow_engine_url: String,
    pub workflow_id: String,
    pub workflow_api_key: String,
    /// Public base URL of this deployment, used to construct the webhook
    /// callback URL handed to the workflow engine.
    pub public_app_url: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            workflow_engine_url: env::var("WORKFLOW_ENGINE_URL")
                .unwrap_or_else(|_| DEFAULT_WORKFLOW_ENGINE_URL.to_string()),
            workflow_id: env::var("WORKFLOW_ID")
                .context("WORKFLOW_ID must be set")?,
            workflow_api_key: env::var("WORKFLOW_API_KEY")
                .context("WORKFLOW_API_KEY must be set")?,
            public_app_url: env::var("PUBLIC_APP_URL")
                .context("PUBLIC_APP_URL must be set")?,
        })
    }

    /// The callback URL the workflow engine posts results to.
    pub fn webhook_url(&self) -> String {
        format!("{}/workflow-webhook", self.public_app_url.trim_end_matches('/'))
    }
}
