//! Tests for generated-content normalization: legacy alias renames,
//! flatten/restructure, and the section registry.

use salespage_core::domains::content::{
    flatten_content, needs_transformation, restructure_content, section, transform_content,
    SECTIONS,
};
use serde_json::json;

#[test]
fn legacy_section_names_are_renamed() {
    let raw = json!({
        "3_steps": { "3_steps_headline": "Three easy steps" },
        "How_To_Get_Maximum_Results": { "maximize_results_headline": "Do more" },
        "testimonials_review_widget": { "review_widget_headline": "Trusted" }
    });

    let out = transform_content(&raw);

    assert!(out.get("3_steps").is_none());
    assert!(out.get("How_To_Get_Maximum_Results").is_none());
    assert!(out.get("testimonials_review_widget").is_none());
    assert_eq!(
        out["three_steps"]["3_steps_headline"],
        json!("Three easy steps")
    );
    assert_eq!(
        out["maximize_results"]["maximize_results_headline"],
        json!("Do more")
    );
    assert_eq!(
        out["store_credibility"]["review_widget_headline"],
        json!("Trusted")
    );
}

#[test]
fn product_main_headline_is_hoisted_into_dynamic_buy_box() {
    let raw = json!({
        "product_main_headline": "The Big Headline",
        "dynamic_buy_box": { "buybox_product_title": "Widget Pro" }
    });

    let out = transform_content(&raw);

    assert!(out.get("product_main_headline").is_none());
    assert_eq!(
        out["dynamic_buy_box"]["product_main_headline"],
        json!("The Big Headline")
    );
    assert_eq!(
        out["dynamic_buy_box"]["buybox_product_title"],
        json!("Widget Pro")
    );
}

#[test]
fn transformation_is_idempotent() {
    let raw = json!({
        "3_steps": { "step_1_headline": "Step one" },
        "product_main_headline": "Headline",
        "guarantee": { "guarantee_headline": "Promise" }
    });

    let once = transform_content(&raw);
    let twice = transform_content(&once);

    assert_eq!(once, twice);
    assert!(!needs_transformation(&once));
}

#[test]
fn canonical_content_passes_through_unchanged() {
    let raw = json!({
        "guarantee": { "guarantee_headline": "Promise", "guarantee_description": "Full refund" },
        "faq": { "faq_question_1": "Q", "faq_answer_1": "A" }
    });

    assert!(!needs_transformation(&raw));
    assert_eq!(transform_content(&raw), raw);
}

#[test]
fn flatten_then_restructure_round_trips_known_fields() {
    let nested = json!({
        "guarantee": { "guarantee_headline": "Promise" },
        "faq": { "faq_question_1": "Q1", "faq_answer_1": "A1" }
    });

    let flat = flatten_content(&nested);
    assert_eq!(flat["guarantee_headline"], json!("Promise"));
    assert_eq!(flat["faq_question_1"], json!("Q1"));

    let rebuilt = restructure_content(&flat);
    assert_eq!(rebuilt, nested);
}

#[test]
fn restructure_drops_unknown_keys() {
    let flat = json!({
        "guarantee_headline": "Promise",
        "totally_unknown_field": "noise"
    });

    let rebuilt = restructure_content(&flat);
    assert_eq!(rebuilt["guarantee"]["guarantee_headline"], json!("Promise"));

    for (_, section_data) in rebuilt.as_object().into_iter().flatten() {
        assert!(section_data.get("totally_unknown_field").is_none());
    }
}

#[test]
fn registry_covers_every_restructured_section() {
    let flat = json!({
        "buybox_product_title": "Widget",
        "guarantee_headline": "Promise"
    });

    for (key, _) in restructure_content(&flat).as_object().into_iter().flatten() {
        assert!(
            section(key).is_some(),
            "restructured section {key} missing from registry"
        );
    }
    assert_eq!(SECTIONS.len(), 17);
}
