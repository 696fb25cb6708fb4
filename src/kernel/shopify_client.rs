//! Shopify Admin GraphQL API client.
//!
//! One client per shop; the access token comes from the shop record. The
//! response `data` value is returned as loose JSON - callers parse the
//! pieces they need and inspect `userErrors` with the helpers below.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use super::retry::{is_idempotent_message, is_retryable_message};
use super::traits::BaseAdminApi;
use crate::domains::shops::models::Shop;

/// Admin API version pinned for all calls.
pub const API_VERSION: &str = "2025-10";

/// Prefix of every stable remote object/file reference.
pub const REFERENCE_PREFIX: &str = "gid://shopify/";

/// Host substring identifying URLs already on the destination CDN.
pub const CDN_HOST: &str = "cdn.shopify.com";

#[derive(Debug, Error)]
pub enum AdminApiError {
    #[error("admin api request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("admin api returned errors: {0}")]
    Graphql(String),
}

/// A `userErrors` entry from an Admin API mutation.
#[derive(Debug, Clone, Deserialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<serde_json::Value>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl UserError {
    pub fn is_retryable(&self) -> bool {
        is_retryable_message(&self.message)
    }

    pub fn is_idempotent_conflict(&self) -> bool {
        let code = self.code.as_deref().unwrap_or_default();
        code.contains("ALREADY") || code.contains("TAKEN") || is_idempotent_message(&self.message)
    }

    /// "Key is in use" conflicts show up while the remote side is still
    /// tearing down a deleted definition; they resolve with time.
    pub fn is_key_in_use(&self) -> bool {
        let message = self.message.to_lowercase();
        message.contains("key is in use") || message.contains("key is already in use")
    }
}

/// Extract the `userErrors` list under `data[mutation].userErrors`.
pub fn user_errors(data: &serde_json::Value, mutation: &str) -> Vec<UserError> {
    data.get(mutation)
        .and_then(|v| v.get("userErrors"))
        .and_then(|v| v.as_array())
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| serde_json::from_value(e.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

pub fn any_retryable(errors: &[UserError]) -> bool {
    errors.iter().any(UserError::is_retryable)
}

pub fn all_idempotent_conflicts(errors: &[UserError]) -> bool {
    !errors.is_empty() && errors.iter().all(UserError::is_idempotent_conflict)
}

pub fn all_key_in_use(errors: &[UserError]) -> bool {
    !errors.is_empty() && errors.iter().all(UserError::is_key_in_use)
}

pub fn error_summary(errors: &[UserError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Reqwest-backed Admin API client for a single shop.
#[derive(Clone)]
pub struct ShopifyClient {
    http: reqwest::Client,
    endpoint: String,
    access_token: String,
}

impl ShopifyClient {
    pub fn for_shop(shop: &Shop) -> Self {
        let endpoint = format!(
            "https://{}/admin/api/{}/graphql.json",
            shop.myshopify_domain, API_VERSION
        );
        Self {
            http: reqwest::Client::new(),
            endpoint,
            access_token: shop.access_token.clone(),
        }
    }
}

#[async_trait]
impl BaseAdminApi for ShopifyClient {
    async fn graphql(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(&serde_json::json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(AdminApiError::Transport)?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.map_err(AdminApiError::Transport)?;

        if !status.is_success() {
            return Err(AdminApiError::Graphql(format!("HTTP {status}: {body}")).into());
        }

        // Top-level GraphQL errors (throttling shows up here with a
        // THROTTLED code, which the retry classifier picks up by message).
        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                let messages = errors
                    .iter()
                    .map(|e| {
                        e.get("message")
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown error")
                            .to_string()
                    })
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(AdminApiError::Graphql(messages).into());
            }
        }

        Ok(body.get("data").cloned().unwrap_or(serde_json::Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_user_errors() {
        let data = json!({
            "metaobjectCreate": {
                "metaobject": null,
                "userErrors": [
                    { "field": ["metaobject"], "message": "Type has already been taken", "code": "TAKEN" }
                ]
            }
        });

        let errors = user_errors(&data, "metaobjectCreate");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_idempotent_conflict());
        assert!(!errors[0].is_retryable());
        assert!(all_idempotent_conflicts(&errors));
    }

    #[test]
    fn missing_user_errors_is_empty() {
        let data = json!({ "metaobjectCreate": { "metaobject": { "id": "gid://shopify/Metaobject/1" } } });
        assert!(user_errors(&data, "metaobjectCreate").is_empty());
    }

    #[test]
    fn key_in_use_detection() {
        let err = UserError {
            field: None,
            message: "Namespace and key is already in use".to_string(),
            code: None,
        };
        assert!(err.is_key_in_use());
    }
}
