//! Image materialization.
//!
//! AI content arrives with image fields holding arbitrary external URLs.
//! Reference-typed fields can only store remote file ids, so every queued
//! URL is pushed through the file-creation API in batches of at most 10
//! (the API's per-call ceiling), with the field key smuggled through the
//! file's alt text so results can be mapped back. Batches that fail all
//! retries lose their fields but never abort the section.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::domains::content::sections::SectionSpec;
use crate::kernel::retry::{retry_with_backoff, RetryPolicy};
use crate::kernel::shopify_client::{any_retryable, error_summary, user_errors, REFERENCE_PREFIX};
use crate::kernel::shopify_client::CDN_HOST;
use crate::kernel::BaseAdminApi;

/// The file-creation API accepts at most this many files per call.
pub const FILE_BATCH_SIZE: usize = 10;
/// Pause between consecutive batches to stay under rate limits.
const INTER_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Single-file processing poll cadence.
const FILE_POLL_INTERVAL: Duration = Duration::from_secs(1);
const FILE_POLL_ATTEMPTS: usize = 15;

const FILE_CREATE_MUTATION: &str = r#"
    mutation FileCreate($files: [FileCreateInput!]!) {
        fileCreate(files: $files) {
            files {
                id
                alt
            }
            userErrors {
                field
                message
                code
            }
        }
    }
"#;

/// Where a field value ends up without any remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDisposition {
    /// Value usable as-is.
    Keep(String),
    /// External URL that must become a file reference.
    Queue(String),
    /// Placeholder or empty value, silently omitted.
    Drop,
}

fn is_placeholder_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    lower.contains("placeholder")
        || lower.contains("example.com")
        || lower.contains("lorem")
        || lower.contains("temp")
}

fn is_image_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    ["jpg", "jpeg", "png", "gif", "webp", "svg"]
        .iter()
        .any(|ext| lower.ends_with(&format!(".{ext}")))
}

fn clean_text(value: &str) -> String {
    value.chars().filter(|c| !c.is_control()).collect()
}

/// Decide what to do with one field value.
///
/// Remote references pass through untouched. CDN-hosted URLs pass through
/// too, except on reference-typed fields, which strictly need an id and so
/// queue the URL for re-upload. Placeholder URLs are dropped.
pub fn classify_field_value(section: &SectionSpec, key: &str, value: &Value) -> FieldDisposition {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Null => return FieldDisposition::Drop,
        other => other.to_string(),
    };
    if text.is_empty() {
        return FieldDisposition::Drop;
    }

    let is_reference_field = section.is_image_field(key);

    if text.starts_with(REFERENCE_PREFIX) {
        return FieldDisposition::Keep(text);
    }

    if text.contains(CDN_HOST) {
        return if is_reference_field {
            FieldDisposition::Queue(text)
        } else {
            FieldDisposition::Keep(text)
        };
    }

    if text.starts_with("http") {
        if is_placeholder_url(&text) {
            return FieldDisposition::Drop;
        }
        return if is_reference_field || is_image_url(&text) {
            FieldDisposition::Queue(text)
        } else {
            FieldDisposition::Keep(text)
        };
    }

    FieldDisposition::Keep(clean_text(&text))
}

/// One section's fields after image materialization.
#[derive(Debug, Default)]
pub struct MaterializedSection {
    /// Field key to final value, ready for object creation.
    pub fields: Vec<(String, String)>,
    /// Field key to the file reference that replaced its URL; used to
    /// rewrite the draft so later reads see stable references.
    pub url_rewrites: BTreeMap<String, String>,
}

/// Materialize every image field of one section's data.
pub async fn materialize_section_images(
    api: &dyn BaseAdminApi,
    section: &SectionSpec,
    data: &Value,
) -> Result<MaterializedSection> {
    let Some(obj) = data.as_object() else {
        return Ok(MaterializedSection::default());
    };

    let mut result = MaterializedSection::default();
    let mut queued: Vec<(String, String)> = Vec::new();

    for (key, value) in obj {
        match classify_field_value(section, key, value) {
            FieldDisposition::Keep(text) => result.fields.push((key.clone(), text)),
            FieldDisposition::Queue(url) => queued.push((key.clone(), url)),
            FieldDisposition::Drop => {}
        }
    }

    if !queued.is_empty() {
        let uploaded = upload_in_batches(api, &queued).await;
        for (key, _url) in &queued {
            if let Some(file_id) = uploaded.get(key) {
                result.fields.push((key.clone(), file_id.clone()));
                result.url_rewrites.insert(key.clone(), file_id.clone());
            }
        }
    }

    // A reference field that never got a file id cannot be sent at all.
    result.fields.retain(|(key, value)| {
        if section.is_image_field(key) && !value.starts_with(REFERENCE_PREFIX) {
            tracing::warn!(
                section = section.key,
                field = %key,
                "Dropping reference field without a materialized file id"
            );
            return false;
        }
        true
    });

    Ok(result)
}

/// Convert queued URLs in batches. Returns field key to file id for every
/// upload that succeeded; failed batches are logged with the field keys
/// they lost.
async fn upload_in_batches(
    api: &dyn BaseAdminApi,
    queued: &[(String, String)],
) -> BTreeMap<String, String> {
    let mut uploaded = BTreeMap::new();
    let total_batches = queued.len().div_ceil(FILE_BATCH_SIZE);

    for (batch_index, batch) in queued.chunks(FILE_BATCH_SIZE).enumerate() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(15))
            .with_timeout(Duration::from_secs(45));
        let op_name = format!("file batch {}/{}", batch_index + 1, total_batches);

        let files: Vec<Value> = batch
            .iter()
            .map(|(key, url)| {
                json!({
                    "originalSource": url,
                    "contentType": "IMAGE",
                    "alt": key,
                })
            })
            .collect();

        let outcome = retry_with_backoff(&policy, &op_name, || {
            let files = files.clone();
            async move {
                let data = api
                    .graphql(FILE_CREATE_MUTATION, json!({ "files": files }))
                    .await?;
                let errors = user_errors(&data, "fileCreate");
                if any_retryable(&errors) {
                    return Err(anyhow!("retryable file errors: {}", error_summary(&errors)));
                }
                Ok(data)
            }
        })
        .await;

        match outcome {
            Ok(data) => {
                let files = data
                    .pointer("/fileCreate/files")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for (index, file) in files.iter().enumerate() {
                    let Some(id) = file.get("id").and_then(Value::as_str) else {
                        continue;
                    };
                    if !id.starts_with(REFERENCE_PREFIX) {
                        continue;
                    }
                    // Alt text carries the field key back; fall back to
                    // positional matching when the API drops it.
                    let key = file
                        .get("alt")
                        .and_then(Value::as_str)
                        .filter(|alt| batch.iter().any(|(k, _)| k == alt))
                        .map(str::to_string)
                        .or_else(|| batch.get(index).map(|(k, _)| k.clone()));
                    if let Some(key) = key {
                        uploaded.insert(key, id.to_string());
                    }
                }
            }
            Err(err) => {
                let lost: Vec<_> = batch.iter().map(|(k, _)| k.as_str()).collect();
                tracing::error!(
                    batch = batch_index + 1,
                    lost_fields = ?lost,
                    error = format!("{err:#}"),
                    "File batch failed after retries, skipping its fields"
                );
            }
        }

        if batch_index + 1 < total_batches {
            tokio::time::sleep(INTER_BATCH_DELAY).await;
        }
    }

    uploaded
}

const FILE_STATUS_QUERY: &str = r#"
    query FileStatus($id: ID!) {
        node(id: $id) {
            ... on MediaImage {
                fileStatus
                image {
                    url
                }
            }
            ... on GenericFile {
                fileStatus
                url
            }
        }
    }
"#;

/// Convert a single URL and wait for the remote file to finish processing.
///
/// File processing is asynchronous on the remote side, so the fresh id may
/// not have a usable preview yet. Polls once a second, up to 15 times:
/// `READY` yields the preview URL, `FAILED` (or poll exhaustion) falls back
/// to the bare file id.
pub async fn materialize_single_url(api: &dyn BaseAdminApi, url: &str) -> Result<String> {
    let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(8))
        .with_timeout(Duration::from_secs(30));

    let data = retry_with_backoff(&policy, "single file create", || async move {
        let data = api
            .graphql(
                FILE_CREATE_MUTATION,
                json!({ "files": [{ "originalSource": url, "contentType": "IMAGE" }] }),
            )
            .await?;
        let errors = user_errors(&data, "fileCreate");
        if any_retryable(&errors) {
            return Err(anyhow!("retryable file errors: {}", error_summary(&errors)));
        }
        if !errors.is_empty() {
            return Err(anyhow!("file create failed: {}", error_summary(&errors)));
        }
        Ok(data)
    })
    .await?;

    let file_id = data
        .pointer("/fileCreate/files/0/id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("file create returned no id"))?
        .to_string();

    for _ in 0..FILE_POLL_ATTEMPTS {
        let status = api
            .graphql(FILE_STATUS_QUERY, json!({ "id": file_id }))
            .await?;
        let file_status = status
            .pointer("/node/fileStatus")
            .and_then(Value::as_str)
            .unwrap_or("");
        match file_status {
            "READY" => {
                let preview = status
                    .pointer("/node/image/url")
                    .or_else(|| status.pointer("/node/url"))
                    .and_then(Value::as_str);
                return Ok(preview.map(str::to_string).unwrap_or(file_id));
            }
            "FAILED" => {
                tracing::warn!(file_id = %file_id, "File processing failed, returning bare id");
                return Ok(file_id);
            }
            _ => tokio::time::sleep(FILE_POLL_INTERVAL).await,
        }
    }

    tracing::warn!(file_id = %file_id, "File never became ready, returning bare id");
    Ok(file_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::content::sections::section;
    use crate::kernel::test_support::MockAdminApi;
    use serde_json::json;

    fn guarantee() -> &'static SectionSpec {
        section("guarantee").unwrap()
    }

    #[test]
    fn remote_references_pass_through() {
        let d = classify_field_value(
            guarantee(),
            "guarantee_seal_image",
            &json!("gid://shopify/MediaImage/1"),
        );
        assert_eq!(d, FieldDisposition::Keep("gid://shopify/MediaImage/1".to_string()));
    }

    #[test]
    fn cdn_url_queues_only_on_reference_fields() {
        let url = json!("https://cdn.shopify.com/s/files/seal.png");
        assert_eq!(
            classify_field_value(guarantee(), "guarantee_seal_image", &url),
            FieldDisposition::Queue("https://cdn.shopify.com/s/files/seal.png".to_string())
        );
        assert_eq!(
            classify_field_value(guarantee(), "guarantee_headline", &url),
            FieldDisposition::Keep("https://cdn.shopify.com/s/files/seal.png".to_string())
        );
    }

    #[test]
    fn placeholder_urls_are_dropped() {
        for url in [
            "https://placeholder.com/300x200.png",
            "https://example.com/image.jpg",
            "https://img.site/lorem-ipsum.png",
            "https://host/TEMP-image.png",
        ] {
            assert_eq!(
                classify_field_value(guarantee(), "guarantee_seal_image", &json!(url)),
                FieldDisposition::Drop,
                "{url}"
            );
        }
    }

    #[test]
    fn empty_and_null_values_are_dropped() {
        assert_eq!(
            classify_field_value(guarantee(), "guarantee_headline", &json!(null)),
            FieldDisposition::Drop
        );
        assert_eq!(
            classify_field_value(guarantee(), "guarantee_headline", &json!("   ")),
            FieldDisposition::Drop
        );
    }

    #[test]
    fn text_fields_lose_control_characters() {
        let d = classify_field_value(
            guarantee(),
            "guarantee_headline",
            &json!("Risk\u{0000}-Free\u{0007}"),
        );
        assert_eq!(d, FieldDisposition::Keep("Risk-Free".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn twenty_three_images_issue_three_batches() {
        let api = MockAdminApi::new(|_query, vars| {
            let files = vars.get("files").and_then(Value::as_array).unwrap();
            assert!(files.len() <= FILE_BATCH_SIZE);
            let created: Vec<Value> = files
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    json!({
                        "id": format!("gid://shopify/MediaImage/{i}"),
                        "alt": f.get("alt").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            Ok(json!({ "fileCreate": { "files": created, "userErrors": [] } }))
        });

        let queued: Vec<(String, String)> = (0..23)
            .map(|i| (format!("field_{i}"), format!("https://host/img{i}.png")))
            .collect();
        let uploaded = upload_in_batches(&api, &queued).await;

        assert_eq!(api.count_calls("fileCreate"), 3);
        assert_eq!(uploaded.len(), 23);
        let sizes: Vec<usize> = api
            .calls_matching("fileCreate")
            .iter()
            .map(|vars| vars.get("files").and_then(Value::as_array).unwrap().len())
            .collect();
        assert_eq!(sizes, vec![10, 10, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_batch_loses_only_its_own_fields() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_handler = calls.clone();
        let api = MockAdminApi::new(move |_query, vars| {
            let files = vars.get("files").and_then(Value::as_array).unwrap();
            let is_first_batch = files[0]
                .get("alt")
                .and_then(Value::as_str)
                .map(|alt| alt == "field_0")
                .unwrap_or(false);
            calls_in_handler.fetch_add(1, Ordering::SeqCst);
            if is_first_batch {
                anyhow::bail!("internal error");
            }
            let created: Vec<Value> = files
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    json!({
                        "id": format!("gid://shopify/MediaImage/{i}"),
                        "alt": f.get("alt").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            Ok(json!({ "fileCreate": { "files": created, "userErrors": [] } }))
        });

        let queued: Vec<(String, String)> = (0..12)
            .map(|i| (format!("field_{i}"), format!("https://host/img{i}.png")))
            .collect();
        let uploaded = upload_in_batches(&api, &queued).await;

        // First batch fails terminally once, second batch succeeds.
        assert_eq!(uploaded.len(), 2);
        assert!(uploaded.contains_key("field_10"));
        assert!(uploaded.contains_key("field_11"));
    }

    #[tokio::test(start_paused = true)]
    async fn section_materialization_rewrites_uploaded_urls() {
        let api = MockAdminApi::new(|_query, vars| {
            let files = vars.get("files").and_then(Value::as_array).unwrap();
            let created: Vec<Value> = files
                .iter()
                .map(|f| {
                    json!({
                        "id": "gid://shopify/MediaImage/77",
                        "alt": f.get("alt").cloned().unwrap_or(Value::Null),
                    })
                })
                .collect();
            Ok(json!({ "fileCreate": { "files": created, "userErrors": [] } }))
        });

        let data = json!({
            "guarantee_headline": "Risk-Free",
            "guarantee_seal_image": "https://host/seal.png",
        });
        let materialized = materialize_section_images(&api, guarantee(), &data)
            .await
            .unwrap();

        assert!(materialized
            .fields
            .contains(&("guarantee_headline".to_string(), "Risk-Free".to_string())));
        assert!(materialized
            .fields
            .contains(&("guarantee_seal_image".to_string(), "gid://shopify/MediaImage/77".to_string())));
        assert_eq!(
            materialized.url_rewrites.get("guarantee_seal_image").map(String::as_str),
            Some("gid://shopify/MediaImage/77")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn single_url_polls_until_ready() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let polls = Arc::new(AtomicUsize::new(0));
        let polls_in_handler = polls.clone();
        let api = MockAdminApi::new(move |query, _vars| {
            if query.contains("fileCreate") {
                return Ok(json!({ "fileCreate": {
                    "files": [{ "id": "gid://shopify/MediaImage/5" }],
                    "userErrors": [],
                }}));
            }
            let n = polls_in_handler.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Ok(json!({ "node": { "fileStatus": "PROCESSING" } }))
            } else {
                Ok(json!({ "node": {
                    "fileStatus": "READY",
                    "image": { "url": "https://cdn.shopify.com/s/files/ready.png" },
                }}))
            }
        });

        let value = materialize_single_url(&api, "https://host/new.png").await.unwrap();
        assert_eq!(value, "https://cdn.shopify.com/s/files/ready.png");
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn single_url_falls_back_to_bare_id_on_failure() {
        let api = MockAdminApi::new(|query, _vars| {
            if query.contains("fileCreate") {
                return Ok(json!({ "fileCreate": {
                    "files": [{ "id": "gid://shopify/MediaImage/6" }],
                    "userErrors": [],
                }}));
            }
            Ok(json!({ "node": { "fileStatus": "FAILED" } }))
        });
        let value = materialize_single_url(&api, "https://host/bad.png").await.unwrap();
        assert_eq!(value, "gid://shopify/MediaImage/6");
    }
}
