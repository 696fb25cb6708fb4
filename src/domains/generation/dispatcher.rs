//! Generation dispatch.
//!
//! Fires a content-generation run at the workflow engine and returns
//! immediately; the run reports back through the webhook correlator, and
//! runs that never report back are swept by the scheduled stale-job task.

use anyhow::{Context, Result};
use base64::Engine as _;
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::config::Config;
use crate::domains::shops::{resolve_shop, Shop, ShopHint};
use crate::kernel::{BaseAdminApi, ShopifyClient, WorkflowClient};

const PRODUCT_GID_PREFIX: &str = "gid://shopify/Product/";
const WORKFLOW_RUN_TITLE: &str = "AI Sales Page Generation";
const MAX_PRODUCT_IMAGES: usize = 5;
const PAYLOAD_SUMMARY_CHARS: usize = 150;

/// A dispatch request from the API surface.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub product_id: String,
    pub product_description: Option<String>,
    pub shop: ShopHint,
}

/// Outcome returned to the caller; generation itself continues async.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DispatchReceipt {
    pub generation_job_id: uuid::Uuid,
    pub message: &'static str,
}

fn normalize_product_gid(product_id: &str) -> String {
    if product_id.starts_with(PRODUCT_GID_PREFIX) {
        product_id.to_string()
    } else {
        format!("{PRODUCT_GID_PREFIX}{product_id}")
    }
}

/// Kick off content generation from the product catalog alone.
pub async fn generate_content(
    request: &GenerateRequest,
    config: &Config,
    pool: &PgPool,
) -> Result<DispatchReceipt> {
    let product_gid = normalize_product_gid(&request.product_id);
    let shop = resolve_shop(&request.shop, pool).await?;
    let api = ShopifyClient::for_shop(&shop);

    let mut payload = base_payload(&product_gid, &shop);
    if let Some(title) = fetch_product_title(&api, &product_gid).await {
        payload.insert("product_name".to_string(), Value::String(title));
    }
    if let Some(description) = request.product_description.as_deref().filter(|d| !d.is_empty()) {
        payload.insert(
            "product_description".to_string(),
            Value::String(description.to_string()),
        );
    }

    dispatch(payload, &product_gid, &shop, config, pool).await
}

/// Kick off content generation seeded by a product page URL, shipping the
/// product's first few images along as base64 data URLs.
pub async fn generate_content_from_url(
    request: &GenerateRequest,
    product_url: &str,
    config: &Config,
    pool: &PgPool,
) -> Result<DispatchReceipt> {
    let product_gid = normalize_product_gid(&request.product_id);
    let shop = resolve_shop(&request.shop, pool).await?;
    let api = ShopifyClient::for_shop(&shop);

    let mut payload = base_payload(&product_gid, &shop);
    payload.insert(
        "product_url".to_string(),
        Value::String(product_url.to_string()),
    );
    for (key, data_url) in fetch_product_images(&api, &product_gid).await {
        payload.insert(key, Value::String(data_url));
    }

    dispatch(payload, &product_gid, &shop, config, pool).await
}

fn base_payload(product_gid: &str, shop: &Shop) -> Map<String, Value> {
    // The engine identifies the shop by its public domain, not our row id.
    let shop_handle = shop.myshopify_domain.clone();
    let mut payload = Map::new();
    payload.insert("product_id".to_string(), Value::String(product_gid.to_string()));
    payload.insert("shop_id".to_string(), Value::String(shop_handle));
    payload
}

async fn dispatch(
    mut payload: Map<String, Value>,
    product_gid: &str,
    shop: &Shop,
    config: &Config,
    pool: &PgPool,
) -> Result<DispatchReceipt> {
    let product_id = product_gid
        .strip_prefix(PRODUCT_GID_PREFIX)
        .unwrap_or(product_gid);
    let job = crate::domains::generation::models::GenerationJob::create(product_id, shop.id, pool)
        .await
        .context("failed to create generation job")?;

    payload.insert(
        "generation_job_id".to_string(),
        Value::String(job.id.to_string()),
    );
    payload.insert(
        "webhook_url".to_string(),
        Value::String(config.webhook_url()),
    );

    tracing::info!(
        job_id = %job.id,
        product_id = %product_gid,
        shop_id = shop.id,
        payload_head = %summarize_payload(&payload),
        "Dispatching generation run to workflow engine"
    );

    let client = WorkflowClient::new(config);
    match client
        .run_workflow(
            &config.workflow_id,
            WORKFLOW_RUN_TITLE,
            &Value::Object(payload),
        )
        .await
    {
        Ok(run) => {
            tracing::info!(
                job_id = %job.id,
                run_id = run.id.as_deref().unwrap_or("unknown"),
                run_status = run.status.as_deref().unwrap_or("unknown"),
                "Workflow engine accepted generation run"
            );
            Ok(DispatchReceipt {
                generation_job_id: job.id,
                message: "Your request has been sent. Response will be available soon.",
            })
        }
        Err(err) => {
            let reason = format!("{err:#}");
            if let Err(update_err) = job.mark_failed(&reason, pool).await {
                tracing::error!(
                    job_id = %job.id,
                    error = %update_err,
                    "Failed to record dispatch failure on generation job"
                );
            }
            Err(err.context("workflow engine rejected generation run"))
        }
    }
}

/// Product title fetch is best-effort: the run proceeds without it.
async fn fetch_product_title(api: &dyn BaseAdminApi, product_gid: &str) -> Option<String> {
    let query = r#"
        query GetProduct($id: ID!) {
            product(id: $id) {
                title
            }
        }
    "#;
    match api.graphql(query, json!({ "id": product_gid })).await {
        Ok(data) => data
            .pointer("/product/title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
        Err(err) => {
            tracing::warn!(product_id = %product_gid, error = %err, "Could not fetch product title");
            None
        }
    }
}

/// Fetch up to [`MAX_PRODUCT_IMAGES`] product images and convert them to
/// `data:` URLs, keyed `product_image1`, `product_image2`, ... Failures on
/// individual images are logged and skipped.
async fn fetch_product_images(api: &dyn BaseAdminApi, product_gid: &str) -> Vec<(String, String)> {
    let query = r#"
        query ProductImagesForBase64($id: ID!) {
            product(id: $id) {
                id
                title
                images(first: 5) {
                    nodes {
                        id
                        altText
                        url
                    }
                }
            }
        }
    "#;
    let data = match api.graphql(query, json!({ "id": product_gid })).await {
        Ok(data) => data,
        Err(err) => {
            tracing::warn!(product_id = %product_gid, error = %err, "Could not fetch product images");
            return Vec::new();
        }
    };

    let nodes = data
        .pointer("/product/images/nodes")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let http = reqwest::Client::new();
    let mut images = Vec::new();
    for (index, node) in nodes.iter().take(MAX_PRODUCT_IMAGES).enumerate() {
        let Some(url) = node.get("url").and_then(Value::as_str) else {
            continue;
        };
        match download_as_data_url(&http, url).await {
            Ok(data_url) => {
                images.push((format!("product_image{}", index + 1), data_url));
            }
            Err(err) => {
                tracing::warn!(
                    image_url = %url,
                    error = %err,
                    "Skipping product image that failed to download"
                );
            }
        }
    }

    if images.is_empty() {
        tracing::warn!(product_id = %product_gid, "No product images available for payload");
    } else {
        tracing::info!(
            product_id = %product_gid,
            image_count = images.len(),
            "Attached product images to payload"
        );
    }
    images
}

async fn download_as_data_url(http: &reqwest::Client, url: &str) -> Result<String> {
    let response = http.get(url).send().await?.error_for_status()?;
    let mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = response.bytes().await?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
    Ok(format!("data:{mime};base64,{encoded}"))
}

/// Truncated view of a payload for logging; base64 blobs would otherwise
/// swamp the log line.
fn summarize_payload(payload: &Map<String, Value>) -> String {
    let mut head = Map::new();
    for (key, value) in payload {
        let summarized = match value {
            Value::String(s) if s.len() > PAYLOAD_SUMMARY_CHARS => {
                let cut: String = s.chars().take(PAYLOAD_SUMMARY_CHARS).collect();
                Value::String(format!("{cut}... (truncated)"))
            }
            other => other.clone(),
        };
        head.insert(key.clone(), summarized);
    }
    Value::Object(head).to_string()
}
