//! Single-image upload for the editing surface.

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::domains::publish::images::materialize_single_url;
use crate::domains::shops::{resolve_shop, ShopHint};
use crate::kernel::ShopifyClient;
use crate::server::app::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadImageBody {
    pub url: String,
    #[serde(default)]
    pub shop_domain: Option<String>,
    #[serde(default)]
    pub shop_id: Option<i64>,
}

/// Convert one external image URL into a stable file value. Returns the
/// ready preview URL when processing finishes in time, otherwise the bare
/// file reference id.
pub async fn upload_image_handler(
    Extension(state): Extension<AppState>,
    Json(body): Json<UploadImageBody>,
) -> (StatusCode, Json<Value>) {
    if body.url.trim().is_empty() || !body.url.starts_with("http") {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "a valid image url is required" })),
        );
    }

    let hint = ShopHint {
        domain: body.shop_domain,
        id: body.shop_id,
    };
    let shop = match resolve_shop(&hint, &state.db_pool).await {
        Ok(shop) => shop,
        Err(err) => {
            tracing::error!(error = format!("{err:#}"), "No shop available for image upload");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "No shop available" })),
            );
        }
    };

    let api = ShopifyClient::for_shop(&shop);
    match materialize_single_url(&api, &body.url).await {
        Ok(value) => (StatusCode::OK, Json(json!({ "success": true, "value": value }))),
        Err(err) => {
            tracing::error!(error = format!("{err:#}"), url = %body.url, "Image upload failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Image upload failed" })),
            )
        }
    }
}
