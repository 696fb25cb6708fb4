//! The publish pipeline.
//!
//! Takes a draft's processed content all the way to a live sales page:
//!
//! ```text
//! transform ─► per section: materialize images ─► upsert object ─► activate
//!                   │
//!                   └─► master object (references every section) ─► activate
//!                              │
//!                   product reference field ─► master id
//!                              │
//!                   persist URL rewrites back onto the draft
//! ```
//!
//! Objects are upserted under deterministic handles derived from the
//! product id, so a re-run of the pipeline updates the same objects
//! instead of orphaning the previous attempt's. A section that fails
//! creation or activation aborts the whole pipeline; lost image fields do
//! not (see the materializer).

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::domains::content::models::ContentDraft;
use crate::domains::content::sections::{
    DEFAULT_THREE_STEPS, MASTER_TYPE, PRODUCT_FIELD_KEY, PRODUCT_FIELD_NAMESPACE, SECTIONS,
};
use crate::domains::content::transform_content;
use crate::domains::shops::SchemaRegistry;
use crate::kernel::retry::{retry_with_backoff, RetryPolicy};
use crate::kernel::shopify_client::{any_retryable, error_summary, user_errors};
use crate::kernel::BaseAdminApi;

const PRODUCT_GID_PREFIX: &str = "gid://shopify/Product/";

const METAOBJECT_UPSERT_MUTATION: &str = r#"
    mutation UpsertMetaobject($handle: MetaobjectHandleInput!, $metaobject: MetaobjectUpsertInput!) {
        metaobjectUpsert(handle: $handle, metaobject: $metaobject) {
            metaobject {
                id
                handle
            }
            userErrors {
                field
                message
                code
            }
        }
    }
"#;

const METAOBJECT_ACTIVATE_MUTATION: &str = r#"
    mutation PublishMetaobject($id: ID!, $metaobject: MetaobjectUpdateInput!) {
        metaobjectUpdate(id: $id, metaobject: $metaobject) {
            metaobject {
                id
                capabilities {
                    publishable {
                        status
                    }
                }
            }
            userErrors {
                field
                message
                code
            }
        }
    }
"#;

const METAFIELDS_SET_MUTATION: &str = r#"
    mutation SetProductMetafield($metafields: [MetafieldsSetInput!]!) {
        metafieldsSet(metafields: $metafields) {
            metafields {
                id
            }
            userErrors {
                field
                message
                code
            }
        }
    }
"#;

/// Everything one pipeline run produced.
#[derive(Debug)]
pub struct PublishOutcome {
    pub master_id: String,
    /// Section key to created/updated object id.
    pub section_ids: BTreeMap<String, String>,
    /// Section key to {field key to file reference} for every image that
    /// was uploaded during this run.
    pub url_rewrites: BTreeMap<String, BTreeMap<String, String>>,
}

fn numeric_product_id(product_id: &str) -> &str {
    product_id
        .strip_prefix(PRODUCT_GID_PREFIX)
        .unwrap_or(product_id)
}

fn product_gid(product_id: &str) -> String {
    if product_id.starts_with(PRODUCT_GID_PREFIX) {
        product_id.to_string()
    } else {
        format!("{PRODUCT_GID_PREFIX}{product_id}")
    }
}

/// Handles are deterministic per product so repeated publishes update in
/// place instead of piling up orphaned objects.
fn section_handle(section_key: &str, product_id: &str) -> String {
    format!(
        "{}-{}",
        section_key.replace('_', "-"),
        numeric_product_id(product_id)
    )
}

fn master_handle(product_id: &str) -> String {
    format!("master-{}", numeric_product_id(product_id))
}

async fn upsert_metaobject(
    api: &dyn BaseAdminApi,
    type_key: &str,
    handle: &str,
    fields: &[(String, String)],
) -> Result<String> {
    let policy = RetryPolicy::new(3, Duration::from_millis(1500), Duration::from_secs(10))
        .with_timeout(Duration::from_secs(30));
    let op_name = format!("upsert {type_key}");

    let variables = json!({
        "handle": { "type": type_key, "handle": handle },
        "metaobject": {
            "fields": fields
                .iter()
                .map(|(key, value)| json!({ "key": key, "value": value }))
                .collect::<Vec<_>>(),
        },
    });

    let data = retry_with_backoff(&policy, &op_name, || {
        let variables = variables.clone();
        async move {
            let data = api.graphql(METAOBJECT_UPSERT_MUTATION, variables).await?;
            let errors = user_errors(&data, "metaobjectUpsert");
            if any_retryable(&errors) {
                return Err(anyhow!("retryable errors: {}", error_summary(&errors)));
            }
            if !errors.is_empty() {
                return Err(anyhow!("upsert failed: {}", error_summary(&errors)));
            }
            Ok(data)
        }
    })
    .await?;

    data.pointer("/metaobjectUpsert/metaobject/id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("metaobjectUpsert returned no id for {type_key}"))
}

/// Flip the object's publishable capability to ACTIVE so the storefront
/// can see it.
async fn activate_metaobject(api: &dyn BaseAdminApi, id: &str, type_key: &str) -> Result<()> {
    let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(8))
        .with_timeout(Duration::from_secs(30));
    let op_name = format!("activate {type_key}");

    retry_with_backoff(&policy, &op_name, || async move {
        let data = api
            .graphql(
                METAOBJECT_ACTIVATE_MUTATION,
                json!({
                    "id": id,
                    "metaobject": {
                        "capabilities": { "publishable": { "status": "ACTIVE" } },
                    },
                }),
            )
            .await?;
        let errors = user_errors(&data, "metaobjectUpdate");
        if any_retryable(&errors) {
            return Err(anyhow!("retryable errors: {}", error_summary(&errors)));
        }
        if !errors.is_empty() {
            return Err(anyhow!("activation failed: {}", error_summary(&errors)));
        }
        Ok(())
    })
    .await
}

async fn set_product_reference(
    api: &dyn BaseAdminApi,
    product_id: &str,
    master_id: &str,
) -> Result<()> {
    let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(8))
        .with_timeout(Duration::from_secs(30));
    let owner_id = product_gid(product_id);

    retry_with_backoff(&policy, "set product reference", || {
        let owner_id = owner_id.clone();
        async move {
            let data = api
                .graphql(
                    METAFIELDS_SET_MUTATION,
                    json!({
                        "metafields": [{
                            "ownerId": owner_id,
                            "namespace": PRODUCT_FIELD_NAMESPACE,
                            "key": PRODUCT_FIELD_KEY,
                            "type": "metaobject_reference",
                            "value": master_id,
                        }],
                    }),
                )
                .await?;
            let errors = user_errors(&data, "metafieldsSet");
            if any_retryable(&errors) {
                return Err(anyhow!("retryable errors: {}", error_summary(&errors)));
            }
            if !errors.is_empty() {
                return Err(anyhow!("metafield set failed: {}", error_summary(&errors)));
            }
            Ok(())
        }
    })
    .await
}

fn default_three_steps_fields() -> Vec<(String, String)> {
    DEFAULT_THREE_STEPS
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Publish content for a product. The registry pins which definitions the
/// synchronizer installed; sections without one are skipped. Database-free;
/// [`publish_draft`] wraps this with draft bookkeeping.
pub async fn publish_content(
    api: &dyn BaseAdminApi,
    product_id: &str,
    content: &Value,
    registry: &SchemaRegistry,
) -> Result<PublishOutcome> {
    let transformed = transform_content(content);

    let mut section_ids = BTreeMap::new();
    let mut url_rewrites = BTreeMap::new();

    for section in SECTIONS {
        let Some(data) = transformed.get(section.key) else {
            continue;
        };
        if !data.as_object().map(|o| !o.is_empty()).unwrap_or(false) {
            continue;
        }
        if registry.definition_id(section.key).is_none() {
            tracing::warn!(
                section = section.key,
                "Section has no synced definition, skipping"
            );
            continue;
        }

        let materialized = super::images::materialize_section_images(api, section, data)
            .await
            .with_context(|| format!("image materialization failed for {}", section.key))?;
        if materialized.fields.is_empty() {
            tracing::warn!(
                section = section.key,
                "No usable fields after materialization, skipping section"
            );
            continue;
        }

        let handle = section_handle(section.key, product_id);
        let id = upsert_metaobject(api, section.key, &handle, &materialized.fields).await?;
        activate_metaobject(api, &id, section.key).await?;

        tracing::info!(
            section = section.key,
            object_id = %id,
            field_count = materialized.fields.len(),
            "Published section object"
        );

        if !materialized.url_rewrites.is_empty() {
            url_rewrites.insert(section.key.to_string(), materialized.url_rewrites);
        }
        section_ids.insert(section.key.to_string(), id);
    }

    // Content that produced no real section (raw-text-only drafts, say)
    // must not ship a page of stock copy.
    if section_ids.is_empty() {
        bail!("content has no publishable sections");
    }

    if registry.definition_id(MASTER_TYPE).is_none() {
        bail!("master definition has not been synced");
    }

    // The master always references a three-steps object, so fill in the
    // stock one when the generated content never produced it.
    if !section_ids.contains_key("three_steps") {
        if registry.definition_id("three_steps").is_none() {
            bail!("three_steps definition has not been synced");
        }
        let handle = section_handle("three_steps", product_id);
        let id =
            upsert_metaobject(api, "three_steps", &handle, &default_three_steps_fields()).await?;
        activate_metaobject(api, &id, "three_steps").await?;
        tracing::info!(object_id = %id, "Published default three-steps section");
        section_ids.insert("three_steps".to_string(), id);
    }

    let master_fields: Vec<(String, String)> = SECTIONS
        .iter()
        .filter_map(|section| {
            section_ids
                .get(section.key)
                .map(|id| (section.key.to_string(), id.clone()))
        })
        .collect();

    let handle = master_handle(product_id);
    let master_id = upsert_metaobject(api, MASTER_TYPE, &handle, &master_fields).await?;
    activate_metaobject(api, &master_id, MASTER_TYPE).await?;

    set_product_reference(api, product_id, &master_id).await?;

    tracing::info!(
        product_id = %product_id,
        master_id = %master_id,
        sections = section_ids.len(),
        "Publish pipeline finished"
    );

    Ok(PublishOutcome {
        master_id,
        section_ids,
        url_rewrites,
    })
}

/// Apply this run's URL rewrites to a content document.
fn apply_rewrites(
    content: &Value,
    rewrites: &BTreeMap<String, BTreeMap<String, String>>,
) -> Value {
    let Some(obj) = content.as_object() else {
        return content.clone();
    };
    let mut updated = obj.clone();
    for (section_key, fields) in rewrites {
        let Some(Value::Object(section)) = updated.get_mut(section_key) else {
            continue;
        };
        for (field_key, reference) in fields {
            if section.contains_key(field_key) {
                section.insert(field_key.clone(), Value::String(reference.clone()));
            }
        }
    }
    Value::Object(updated)
}

/// Publish a draft and record the outcome on it.
pub async fn publish_draft(
    api: &dyn BaseAdminApi,
    draft: &ContentDraft,
    pool: &PgPool,
) -> Result<PublishOutcome> {
    let has_content = draft
        .processed_content
        .as_object()
        .map(|o| !o.is_empty())
        .unwrap_or(false);
    if !has_content {
        bail!("draft {} has no processed content to publish", draft.id);
    }

    // The registry holds the definitions the synchronizer installed for
    // this shop; publishing against an unsynced schema cannot work.
    let registry = SchemaRegistry::find_by_shop(draft.shop_id, pool)
        .await?
        .with_context(|| format!("schema has not been synced for shop {}", draft.shop_id))?;

    let outcome =
        publish_content(api, &draft.product_id, &draft.processed_content, &registry).await?;

    // Swap uploaded URLs for their file references so previews and future
    // edits read the stable ids.
    let draft = if outcome.url_rewrites.is_empty() {
        draft.clone()
    } else {
        let rewritten = apply_rewrites(&draft.processed_content, &outcome.url_rewrites);
        draft.update_processed_content(&rewritten, pool).await?
    };

    draft.mark_published(pool).await?;
    Ok(outcome)
}
