//! Tests for workflow-run webhook parsing: correlation, output
//! classification, content selection, and the job transition table.

use salespage_core::domains::generation::webhook::{
    classify_output, correlation_id, select_content, transition, ParsedOutput, RunEntry,
    WorkflowRunPayload,
};
use salespage_core::domains::generation::JobStatus;
use serde_json::json;

fn entry(title: &str, content: serde_json::Value) -> RunEntry {
    RunEntry {
        title: Some(title.to_string()),
        content: Some(content),
    }
}

#[test]
fn webhook_payload_deserializes_with_missing_arrays() {
    let payload: WorkflowRunPayload =
        serde_json::from_value(json!({ "workflow_run_id": "run-1" })).unwrap();

    assert_eq!(payload.workflow_run_id.as_deref(), Some("run-1"));
    assert!(payload.workflow_run_input.is_empty());
    assert!(payload.workflow_run_output.is_empty());
}

#[test]
fn correlation_id_requires_exact_input_title() {
    let payload: WorkflowRunPayload = serde_json::from_value(json!({
        "workflow_run_input": [
            { "title": "product_id", "content": "gid://shopify/Product/1" },
            { "title": "Generation Job Id", "content": "nope" },
            { "title": "generation_job_id", "content": "abc-123" }
        ]
    }))
    .unwrap();

    assert_eq!(correlation_id(&payload), Some("abc-123"));
}

#[test]
fn correlation_id_missing_when_no_matching_input() {
    let payload: WorkflowRunPayload = serde_json::from_value(json!({
        "workflow_run_input": [{ "title": "product_id", "content": "x" }]
    }))
    .unwrap();

    assert_eq!(correlation_id(&payload), None);
}

#[test]
fn fenced_json_output_is_structured() {
    let text = "Here you go:\n```json\n{\"guarantee\": {\"guarantee_headline\": \"Promise\"}}\n```\nDone.";
    match classify_output(&entry("Writer", json!(text))) {
        ParsedOutput::Structured(v) => {
            assert_eq!(v["guarantee"]["guarantee_headline"], json!("Promise"));
        }
        other => panic!("expected structured output, got {other:?}"),
    }
}

#[test]
fn legacy_section_names_count_as_recognized() {
    let out = classify_output(&entry(
        "Writer",
        json!({ "3_steps": { "3_steps_headline": "Steps" } }),
    ));
    assert!(matches!(out, ParsedOutput::Structured(_)));
}

#[test]
fn unrecognized_json_object_is_not_structured() {
    let out = classify_output(&entry("Writer", json!({ "completely": "unrelated" })));
    assert!(matches!(out, ParsedOutput::Unrecognized));
}

#[test]
fn long_prose_is_raw_text() {
    let prose = "This product is a revolutionary widget that solves many problems for many people.";
    match classify_output(&entry("Writer", json!(prose))) {
        ParsedOutput::RawText(text) => assert_eq!(text, prose),
        other => panic!("expected raw text, got {other:?}"),
    }
}

#[test]
fn short_text_is_unrecognized() {
    let out = classify_output(&entry("Writer", json!("ok")));
    assert!(matches!(out, ParsedOutput::Unrecognized));
}

#[test]
fn structured_output_wins_over_earlier_raw_text() {
    let outputs = vec![
        entry("Notes", json!("A long enough preamble about the product that is clearly prose text.")),
        entry("Writer", json!({ "guarantee": { "guarantee_headline": "Promise" } })),
    ];

    let selected = select_content(&outputs).unwrap();
    assert_eq!(selected["guarantee"]["guarantee_headline"], json!("Promise"));
}

#[test]
fn raw_text_fallback_is_wrapped() {
    let prose = "A long enough preamble about the product that is clearly prose text.";
    let outputs = vec![entry("Notes", json!(prose))];

    let selected = select_content(&outputs).unwrap();
    assert_eq!(selected["raw_text"], json!(prose));
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
fn terminal_statuses_never_change() {
    for status in [JobStatus::Completed, JobStatus::Failed] {
        for has_content in [true, false] {
            let t = transition(status, has_content);
            assert_eq!(t.new_status, status);
            assert_eq!(t.save_content, has_content);
        }
    }
}
