//! Content normalization.
//!
//! AI-generated drafts arrive with legacy section and field names and with a
//! handful of fields at the wrong nesting level. Everything that touches
//! draft content (the editor, the publish pipeline) funnels through
//! [`transform_content`] first so downstream code only ever sees canonical
//! registry names. The transform is idempotent: feeding its output back in
//! produces the same value.

use serde_json::{Map, Value};

use super::sections::{self, SECTIONS};

/// Legacy section keys and their canonical registry names.
pub const SECTION_ALIASES: &[(&str, &str)] = &[
    ("3_steps", "three_steps"),
    ("How_To_Get_Maximum_Results", "maximize_results"),
    ("testimonials_review_widget", "store_credibility"),
];

/// Legacy field keys inside the maximize-results section.
pub const FIELD_ALIASES: &[(&str, &str)] = &[
    ("How_To_Get_Maximum_Results_headline", "maximize_results_headline"),
    ("How_To_Get_Maximum_Results_1_image", "maximize_results_1_image"),
    ("How_To_Get_Maximum_Results_title_1", "maximize_results_title_1"),
    ("How_To_Get_Maximum_Results_description_1", "maximize_results_description_1"),
    ("How_To_Get_Maximum_Results_2_image", "maximize_results_2_image"),
    ("How_To_Get_Maximum_Results_title_2", "maximize_results_title_2"),
    ("How_To_Get_Maximum_Results_description_2", "maximize_results_description_2"),
    ("How_To_Get_Maximum_Results_3_image", "maximize_results_3_image"),
    ("How_To_Get_Maximum_Results_title_3", "maximize_results_title_3"),
    ("How_To_Get_Maximum_Results_description_3", "maximize_results_description_3"),
];

fn canonical_field_key(key: &str) -> &str {
    FIELD_ALIASES
        .iter()
        .find(|(legacy, _)| *legacy == key)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(key)
}

/// Normalize a content document to canonical section and field names.
///
/// Non-object values pass through untouched. For objects:
/// - legacy section keys are renamed per [`SECTION_ALIASES`];
/// - fields of the legacy maximize-results section are renamed per
///   [`FIELD_ALIASES`] (unaliased keys in that section are kept as-is);
/// - maximize-results fields that leaked to the top level are gathered back
///   into the section;
/// - a top-level `product_main_headline` is moved into `dynamic_buy_box`.
pub fn transform_content(content: &Value) -> Value {
    let Some(obj) = content.as_object() else {
        return content.clone();
    };
    let mut transformed = obj.clone();

    for (legacy, canonical) in SECTION_ALIASES {
        if let Some(section) = transformed.remove(*legacy) {
            let renamed = match section {
                Value::Object(fields) => Value::Object(
                    fields
                        .into_iter()
                        .map(|(k, v)| (canonical_field_key(&k).to_string(), v))
                        .collect(),
                ),
                other => other,
            };
            merge_into_section(&mut transformed, canonical, renamed);
        }
    }

    // Maximize-results fields the editor flattened to the top level.
    let stray: Vec<String> = transformed
        .keys()
        .filter(|k| {
            FIELD_ALIASES
                .iter()
                .any(|(legacy, canonical)| k.as_str() == *legacy || k.as_str() == *canonical)
        })
        .cloned()
        .collect();
    for key in stray {
        if let Some(value) = transformed.remove(&key) {
            let canonical = canonical_field_key(&key).to_string();
            section_entry(&mut transformed, "maximize_results").insert(canonical, value);
        }
    }

    if let Some(headline) = transformed.remove("product_main_headline") {
        section_entry(&mut transformed, "dynamic_buy_box")
            .insert("product_main_headline".to_string(), headline);
    }

    Value::Object(transformed)
}

fn section_entry<'a>(obj: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let entry = obj
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn merge_into_section(obj: &mut Map<String, Value>, key: &str, value: Value) {
    match value {
        Value::Object(fields) => {
            let target = section_entry(obj, key);
            for (k, v) in fields {
                target.insert(k, v);
            }
        }
        other => {
            obj.insert(key.to_string(), other);
        }
    }
}

/// Flatten nested section objects to a single level of fields, renaming
/// legacy field keys. Scalar values at the top level survive unchanged.
pub fn flatten_content(content: &Value) -> Value {
    let Some(obj) = content.as_object() else {
        return content.clone();
    };
    let mut flattened = Map::new();
    for (key, value) in obj {
        match value {
            Value::Object(nested) => {
                for (nested_key, nested_value) in nested {
                    flattened.insert(
                        canonical_field_key(nested_key).to_string(),
                        nested_value.clone(),
                    );
                }
            }
            other => {
                flattened.insert(canonical_field_key(key).to_string(), other.clone());
            }
        }
    }
    Value::Object(flattened)
}

/// Rebuild the nested section structure from a flat field map using the
/// section registry. Fields no section declares are dropped.
pub fn restructure_content(flat: &Value) -> Value {
    let Some(obj) = flat.as_object() else {
        return flat.clone();
    };
    let mut nested = Map::new();
    for section in SECTIONS {
        let mut fields = Map::new();
        for field in section.fields {
            if let Some(value) = obj.get(canonical_field_key(field.key)) {
                fields.insert(field.key.to_string(), value.clone());
            }
        }
        if !fields.is_empty() {
            nested.insert(section.key.to_string(), Value::Object(fields));
        }
    }
    Value::Object(nested)
}

/// Whether a document still contains legacy names or misplaced fields.
pub fn needs_transformation(content: &Value) -> bool {
    let Some(obj) = content.as_object() else {
        return false;
    };
    obj.keys().any(|k| {
        k == "product_main_headline"
            || SECTION_ALIASES.iter().any(|(legacy, _)| k == legacy)
            || FIELD_ALIASES
                .iter()
                .any(|(legacy, canonical)| k == legacy || k == canonical)
    })
}

/// True when `key` names a section in the registry, directly or through an
/// alias.
pub fn is_known_section_key(key: &str) -> bool {
    sections::section(key).is_some()
        || SECTION_ALIASES.iter().any(|(legacy, _)| *legacy == key)
}
