//! Content-generation API.

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domains::generation::dispatcher::{
    generate_content, generate_content_from_url, GenerateRequest,
};
use crate::domains::shops::ShopHint;
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct GenerateBody {
    pub product_id: String,
    #[serde(default)]
    pub product_description: Option<String>,
    #[serde(default)]
    pub shop_domain: Option<String>,
    #[serde(default)]
    pub shop_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateFromUrlBody {
    pub product_id: String,
    pub product_url: String,
    #[serde(default)]
    pub shop_domain: Option<String>,
    #[serde(default)]
    pub shop_id: Option<i64>,
}

fn to_request(
    product_id: String,
    product_description: Option<String>,
    shop_domain: Option<String>,
    shop_id: Option<i64>,
) -> GenerateRequest {
    GenerateRequest {
        product_id,
        product_description,
        shop: ShopHint {
            domain: shop_domain,
            id: shop_id,
        },
    }
}

pub async fn generate_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<GenerateBody>,
) -> (StatusCode, Json<Value>) {
    if body.product_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "product_id is required" })),
        );
    }

    let request = to_request(
        body.product_id,
        body.product_description,
        body.shop_domain,
        body.shop_id,
    );
    match generate_content(&request, &state.config, &state.db_pool).await {
        Ok(receipt) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "success": true,
                "message": receipt.message,
                "generation_job_id": receipt.generation_job_id,
            })),
        ),
        Err(err) => {
            tracing::error!(error = format!("{err:#}"), "Content generation dispatch failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to start content generation" })),
            )
        }
    }
}

pub async fn generate_from_url_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<GenerateFromUrlBody>,
) -> (StatusCode, Json<Value>) {
    if body.product_id.trim().is_empty() || body.product_url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "product_id and product_url are required" })),
        );
    }

    let request = to_request(body.product_id, None, body.shop_domain, body.shop_id);
    match generate_content_from_url(&request, &body.product_url, &state.config, &state.db_pool)
        .await
    {
        Ok(receipt) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "success": true,
                "message": receipt.message,
                "generation_job_id": receipt.generation_job_id,
            })),
        ),
        Err(err) => {
            tracing::error!(
                error = format!("{err:#}"),
                "Content generation from URL dispatch failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to start content generation" })),
            )
        }
    }
}
