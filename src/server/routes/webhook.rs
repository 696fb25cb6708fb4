//! Inbound workflow-engine webhook.
//!
//! The engine's deliveries are loosely shaped: the body may be a JSON
//! object or a JSON string containing JSON. The handler normalizes both,
//! then always acknowledges with 200 once the payload parsed - downstream
//! failures are the correlator's problem, and the engine must not retry a
//! delivery we already ingested.

use axum::{body::Bytes, extract::Extension, http::StatusCode, Json};
use chrono::Utc;
use serde_json::{json, Value};

use crate::domains::generation::webhook::{process_webhook, WorkflowRunPayload};
use crate::server::app::AppState;

pub async fn webhook_handler(
    Extension(state): Extension<AppState>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    if body.is_empty() {
        tracing::error!("Empty payload received on workflow webhook");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Empty payload" })),
        );
    }

    let mut parsed: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!("Failed to parse workflow webhook body as JSON");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid JSON payload" })),
            );
        }
    };

    // Some deliveries arrive JSON-encoded twice.
    if let Value::String(inner) = &parsed {
        match serde_json::from_str(inner) {
            Ok(value) => parsed = value,
            Err(_) => {
                tracing::error!("Workflow webhook body is a string but not JSON");
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Invalid JSON payload" })),
                );
            }
        }
    }

    let payload: WorkflowRunPayload = match serde_json::from_value(parsed) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::error!(error = %err, "Workflow webhook payload has unexpected shape");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid JSON payload" })),
            );
        }
    };

    match process_webhook(&payload, &state.db_pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "message": "Webhook received and processed",
                "timestamp": Utc::now().to_rfc3339(),
            })),
        ),
        Err(err) => {
            tracing::error!(error = format!("{err:#}"), "Error processing workflow webhook");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error",
                    "message": "Failed to process webhook",
                })),
            )
        }
    }
}
