//! Test doubles for the Admin API seam.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use super::traits::BaseAdminApi;

type Handler = Box<dyn Fn(&str, &serde_json::Value) -> Result<serde_json::Value> + Send + Sync>;

/// Scripted [`BaseAdminApi`] that records every call.
pub struct MockAdminApi {
    handler: Handler,
    pub calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl MockAdminApi {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &serde_json::Value) -> Result<serde_json::Value> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Number of recorded calls whose query contains `needle`.
    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(query, _)| query.contains(needle))
            .count()
    }

    /// Variables of the recorded calls whose query contains `needle`.
    pub fn calls_matching(&self, needle: &str) -> Vec<serde_json::Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(query, _)| query.contains(needle))
            .map(|(_, vars)| vars.clone())
            .collect()
    }
}

#[async_trait]
impl BaseAdminApi for MockAdminApi {
    async fn graphql(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value> {
        self.calls
            .lock()
            .unwrap()
            .push((query.to_string(), variables.clone()));
        (self.handler)(query, &variables)
    }
}
