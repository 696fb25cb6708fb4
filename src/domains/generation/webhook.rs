//! Webhook correlation.
//!
//! The workflow engine calls back with the run's echoed inputs and its
//! outputs. This module recovers the generation job id from the input echo,
//! extracts usable content from the outputs, applies the job state machine,
//! and on success saves a draft and hands it to the publish pipeline.
//!
//! ```text
//! payload ─► correlation_id ─► load job ─► transition(status, has_content)
//!                                              │
//!                          save draft ◄────────┤ (content present)
//!                              │               │
//!                          schema sync         └─► mark completed/failed
//!                              │
//!                          publish pipeline (best effort)
//! ```
//!
//! Once the payload parses, the webhook is acknowledged no matter what
//! happens downstream: schema-sync and publish failures are logged, never
//! propagated. The engine delivers at-least-once, so every step here
//! tolerates redelivery.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domains::content::models::ContentDraft;
use crate::domains::content::{is_known_section_key, transform_content, FIELD_ALIASES, SECTIONS};
use crate::domains::publish;
use crate::domains::shops::Shop;
use crate::kernel::ShopifyClient;

use super::models::{GenerationJob, JobStatus};

/// Input-echo entry title that carries the correlation id.
pub const CORRELATION_INPUT_TITLE: &str = "generation_job_id";

/// Error message recorded when a run finishes without usable content.
pub const NO_VALID_CONTENT_ERROR: &str = "no valid content";

/// Minimum length for a plain-text output to count as content.
const MIN_RAW_TEXT_LEN: usize = 50;

/// Payload fields that must never reach the user-facing draft. The engine
/// echoes our own dispatch parameters back inside some outputs.
pub const DRAFT_FIELD_DENYLIST: &[&str] = &[
    "generation_job_id",
    "product_id",
    "shop_id",
    "shop_domain",
    "webhook_url",
    "workflow_run_id",
    "product_name",
    "product_description",
];

lazy_static! {
    static ref JSON_FENCE: Regex =
        Regex::new(r"```json\s*\n([\s\S]*?)\n```").unwrap();
}

/// One entry of the run's input echo or output list.
#[derive(Debug, Clone, Deserialize)]
pub struct RunEntry {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
}

/// The engine's callback payload.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRunPayload {
    #[serde(default)]
    pub workflow_run_id: Option<String>,
    #[serde(default)]
    pub workflow_run_input: Vec<RunEntry>,
    #[serde(default)]
    pub workflow_run_output: Vec<RunEntry>,
}

/// What one output entry turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedOutput {
    /// A JSON object carrying at least one recognized section or field.
    Structured(Value),
    /// Plain text long enough to keep as unstructured content.
    RawText(String),
    /// Nothing usable.
    Unrecognized,
}

/// Recover the correlation id from the input echo.
pub fn correlation_id(payload: &WorkflowRunPayload) -> Option<&str> {
    payload
        .workflow_run_input
        .iter()
        .find(|entry| entry.title.as_deref() == Some(CORRELATION_INPUT_TITLE))
        .and_then(|entry| entry.content.as_ref())
        .and_then(Value::as_str)
}

fn strip_json_fence(text: &str) -> &str {
    if !text.contains("```json") {
        return text;
    }
    JSON_FENCE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(text)
}

fn is_recognized_content(obj: &Map<String, Value>) -> bool {
    obj.keys().any(|key| {
        is_known_section_key(key)
            || key == "product_main_headline"
            || FIELD_ALIASES
                .iter()
                .any(|(legacy, canonical)| key == legacy || key == canonical)
            || SECTIONS
                .iter()
                .any(|section| section.field(key).is_some())
    })
}

/// Classify one output entry.
pub fn classify_output(entry: &RunEntry) -> ParsedOutput {
    let Some(content) = entry.content.as_ref() else {
        return ParsedOutput::Unrecognized;
    };

    // Outputs may arrive pre-parsed or as a (possibly fenced) JSON string.
    let candidate = match content {
        Value::Object(obj) => {
            return if is_recognized_content(obj) {
                ParsedOutput::Structured(content.clone())
            } else {
                ParsedOutput::Unrecognized
            };
        }
        Value::String(text) => text,
        _ => return ParsedOutput::Unrecognized,
    };

    let stripped = strip_json_fence(candidate);
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(stripped) {
        if is_recognized_content(&obj) {
            return ParsedOutput::Structured(Value::Object(obj));
        }
        return ParsedOutput::Unrecognized;
    }

    let trimmed = candidate.trim();
    if trimmed.len() > MIN_RAW_TEXT_LEN {
        return ParsedOutput::RawText(trimmed.to_string());
    }
    ParsedOutput::Unrecognized
}

/// Pick the content to save: the first structured output wins; failing
/// that, the first sufficiently long text output, wrapped so callers always
/// see an object.
pub fn select_content(outputs: &[RunEntry]) -> Option<Value> {
    let mut raw_text = None;
    for entry in outputs {
        match classify_output(entry) {
            ParsedOutput::Structured(value) => return Some(value),
            ParsedOutput::RawText(text) => {
                if raw_text.is_none() {
                    raw_text = Some(text);
                }
            }
            ParsedOutput::Unrecognized => {}
        }
    }
    raw_text.map(|text| json!({ "raw_text": text }))
}

/// What the state machine decided for one webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub new_status: JobStatus,
    pub save_content: bool,
}

/// The job state machine, total over (status, has_content).
///
/// A failed job never flips back: a late webhook after the reaper fired
/// still saves its content, but the failure stands. A completed job accepts
/// redelivered content without re-transitioning.
pub fn transition(status: JobStatus, has_content: bool) -> Transition {
    match (status, has_content) {
        (JobStatus::Pending | JobStatus::InProgress, true) => Transition {
            new_status: JobStatus::Completed,
            save_content: true,
        },
        (JobStatus::Pending | JobStatus::InProgress, false) => Transition {
            new_status: JobStatus::Failed,
            save_content: false,
        },
        (JobStatus::Completed, has_content) => Transition {
            new_status: JobStatus::Completed,
            save_content: has_content,
        },
        (JobStatus::Failed, has_content) => Transition {
            new_status: JobStatus::Failed,
            save_content: has_content,
        },
    }
}

fn strip_denylist(content: &Value) -> Value {
    let Some(obj) = content.as_object() else {
        return content.clone();
    };
    let cleaned: Map<String, Value> = obj
        .iter()
        .filter(|(key, _)| !DRAFT_FIELD_DENYLIST.contains(&key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Value::Object(cleaned)
}

/// Process one webhook delivery end to end.
///
/// Errors returned here mean the payload could not be handled at all;
/// downstream schema-sync/publish failures are swallowed after logging.
pub async fn process_webhook(payload: &WorkflowRunPayload, pool: &PgPool) -> Result<()> {
    tracing::info!(
        workflow_run_id = payload.workflow_run_id.as_deref().unwrap_or("unknown"),
        "Processing workflow webhook"
    );

    let Some(id_str) = correlation_id(payload) else {
        let titles: Vec<_> = payload
            .workflow_run_input
            .iter()
            .filter_map(|e| e.title.as_deref())
            .collect();
        tracing::warn!(
            input_titles = ?titles,
            "No generation job id found in workflow inputs"
        );
        return Ok(());
    };

    let job_id = match Uuid::parse_str(id_str) {
        Ok(id) => id,
        Err(_) => {
            tracing::warn!(correlation_id = %id_str, "Correlation id is not a valid job id");
            return Ok(());
        }
    };

    let Some(job) = GenerationJob::find_by_id(job_id, pool).await? else {
        tracing::warn!(job_id = %job_id, "Generation job not found for webhook");
        return Ok(());
    };

    let content = select_content(&payload.workflow_run_output);
    let decision = transition(job.status, content.is_some());

    tracing::info!(
        job_id = %job.id,
        current_status = %job.status,
        new_status = %decision.new_status,
        has_content = content.is_some(),
        "Applying webhook transition"
    );

    let job = match (job.status, decision.new_status) {
        (JobStatus::Pending | JobStatus::InProgress, JobStatus::Completed) => {
            job.mark_completed(pool).await?
        }
        (JobStatus::Pending | JobStatus::InProgress, JobStatus::Failed) => {
            job.mark_failed(NO_VALID_CONTENT_ERROR, pool).await?
        }
        _ => job,
    };

    let Some(content) = content else {
        return Ok(());
    };
    if !decision.save_content {
        return Ok(());
    }

    let raw_content = strip_denylist(&content);
    let processed_content = transform_content(&raw_content);

    let draft = ContentDraft::upsert_for_job(
        job.id,
        &job.product_id,
        job.shop_id,
        &raw_content,
        &processed_content,
        pool,
    )
    .await
    .context("failed to save content draft")?;

    tracing::info!(
        job_id = %job.id,
        draft_id = %draft.id,
        "Saved content draft from webhook"
    );

    // Publish is best effort from here on: the draft is safe either way.
    let shop = match Shop::find_by_id(job.shop_id, pool).await {
        Ok(Some(shop)) => shop,
        Ok(None) => {
            tracing::error!(
                job_id = %job.id,
                shop_id = job.shop_id,
                "Shop not found, skipping publish"
            );
            return Ok(());
        }
        Err(err) => {
            tracing::error!(job_id = %job.id, error = %err, "Shop lookup failed, skipping publish");
            return Ok(());
        }
    };

    let api = ShopifyClient::for_shop(&shop);
    if let Err(err) = publish::schema_sync::sync_schema(&api, &shop, pool).await {
        tracing::error!(
            shop_id = shop.id,
            error = format!("{err:#}"),
            "Schema sync failed, skipping publish"
        );
        return Ok(());
    }

    if let Err(err) = publish::pipeline::publish_draft(&api, &draft, pool).await {
        tracing::error!(
            job_id = %job.id,
            draft_id = %draft.id,
            error = format!("{err:#}"),
            "Publish pipeline failed after webhook"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(title: Option<&str>, content: Value) -> RunEntry {
        RunEntry {
            title: title.map(str::to_string),
            content: Some(content),
        }
    }

    #[test]
    fn correlation_id_requires_exact_title() {
        let payload = WorkflowRunPayload {
            workflow_run_id: None,
            workflow_run_input: vec![
                entry(Some("product_id"), json!("gid://shopify/Product/1")),
                entry(Some("generation_job_id"), json!("abc-123")),
            ],
            workflow_run_output: vec![],
        };
        assert_eq!(correlation_id(&payload), Some("abc-123"));

        let payload = WorkflowRunPayload {
            workflow_run_id: None,
            workflow_run_input: vec![entry(Some("job_id"), json!("abc-123"))],
            workflow_run_output: vec![],
        };
        assert_eq!(correlation_id(&payload), None);
    }

    #[test]
    fn fenced_json_output_parses_as_structured() {
        let fenced = "Here is your content:\n```json\n{\"guarantee\": {\"guarantee_headline\": \"Risk-Free\"}}\n```\nEnjoy!";
        let parsed = classify_output(&entry(None, json!(fenced)));
        match parsed {
            ParsedOutput::Structured(value) => {
                assert_eq!(value["guarantee"]["guarantee_headline"], "Risk-Free");
            }
            other => panic!("expected structured output, got {other:?}"),
        }
    }

    #[test]
    fn unfenced_json_string_parses_as_structured() {
        let parsed = classify_output(&entry(None, json!("{\"faq\": {\"faq_question_1\": \"Q?\"}}")));
        assert!(matches!(parsed, ParsedOutput::Structured(_)));
    }

    #[test]
    fn json_without_recognized_keys_is_unrecognized() {
        let parsed = classify_output(&entry(None, json!({"totally": "unrelated"})));
        assert_eq!(parsed, ParsedOutput::Unrecognized);
    }

    #[test]
    fn aliased_section_keys_are_recognized() {
        let parsed = classify_output(&entry(None, json!({"3_steps": {"step_1_headline": "Go"}})));
        assert!(matches!(parsed, ParsedOutput::Structured(_)));
    }

    #[test]
    fn long_text_becomes_raw_text() {
        let text = "This is a long narrative sales pitch that clearly exceeds fifty characters in total length.";
        let parsed = classify_output(&entry(None, json!(text)));
        assert_eq!(parsed, ParsedOutput::RawText(text.to_string()));
    }

    #[test]
    fn short_text_is_unrecognized() {
        assert_eq!(
            classify_output(&entry(None, json!("too short"))),
            ParsedOutput::Unrecognized
        );
    }

    #[test]
    fn structured_output_beats_raw_text() {
        let outputs = vec![
            entry(None, json!("A sufficiently long piece of narrative text that is over fifty characters.")),
            entry(None, json!({"cta": {"button_text": "Buy"}})),
        ];
        let content = select_content(&outputs).unwrap();
        assert_eq!(content["cta"]["button_text"], "Buy");
    }

    #[test]
    fn raw_text_is_wrapped() {
        let outputs = vec![entry(
            None,
            json!("A sufficiently long piece of narrative text that is over fifty characters."),
        )];
        let content = select_content(&outputs).unwrap();
        assert!(content["raw_text"].as_str().unwrap().starts_with("A sufficiently"));
    }

    #[test]
    fn empty_outputs_yield_no_content() {
        assert_eq!(select_content(&[]), None);
        let outputs = vec![entry(None, json!("nope")), entry(None, json!(42))];
        assert_eq!(select_content(&outputs), None);
    }

    #[test]
    fn live_job_with_content_completes() {
        for status in [JobStatus::Pending, JobStatus::InProgress] {
            let t = transition(status, true);
            assert_eq!(t.new_status, JobStatus::Completed);
            assert!(t.save_content);
        }
    }

    #[test]
    fn live_job_without_content_fails() {
        for status in [JobStatus::Pending, JobStatus::InProgress] {
            let t = transition(status, false);
            assert_eq!(t.new_status, JobStatus::Failed);
            assert!(!t.save_content);
        }
    }

    #[test]
    fn failed_job_never_flips_back() {
        let t = transition(JobStatus::Failed, true);
        assert_eq!(t.new_status, JobStatus::Failed);
        assert!(t.save_content);

        let t = transition(JobStatus::Failed, false);
        assert_eq!(t.new_status, JobStatus::Failed);
        assert!(!t.save_content);
    }

    #[test]
    fn duplicate_delivery_to_completed_job_saves_again() {
        let t = transition(JobStatus::Completed, true);
        assert_eq!(t.new_status, JobStatus::Completed);
        assert!(t.save_content);

        let t = transition(JobStatus::Completed, false);
        assert_eq!(t.new_status, JobStatus::Completed);
        assert!(!t.save_content);
    }

    #[test]
    fn denylist_fields_are_stripped() {
        let content = json!({
            "generation_job_id": "abc",
            "webhook_url": "https://example.com/hook",
            "guarantee": {"guarantee_headline": "Risk-Free"}
        });
        let cleaned = strip_denylist(&content);
        assert!(cleaned.get("generation_job_id").is_none());
        assert!(cleaned.get("webhook_url").is_none());
        assert_eq!(cleaned["guarantee"]["guarantee_headline"], "Risk-Free");
    }
}
