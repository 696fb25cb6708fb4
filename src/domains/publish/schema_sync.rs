//! Schema synchronization.
//!
//! Before anything can be published, every section type, the master
//! aggregate type, and the product's reference field must exist remotely
//! with the exact shape the registry declares. The synchronizer
//! reconciles each one independently:
//!
//! ```text
//! for each type:
//!   fetch by type key ──► matches desired? ──► keep id
//!                              │ no
//!                       delete, settle 2s, create
//!                              │ "key in use"
//!                       wait 3s, create once more
//!                              │ still failing
//!                       re-fetch (a concurrent sync may have won)
//! ```
//!
//! Every remote call goes through the retry executor with a client-side
//! timeout, so a transient throttle never drops a type from the outcome.
//! A type that cannot be reconciled is logged and skipped; the remaining
//! types still get processed. The product reference field is handled last
//! because its validation depends on the master type's id.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::domains::content::sections::{
    FieldKind, SectionSpec, MASTER_NAME, MASTER_TYPE, PRODUCT_FIELD_KEY, PRODUCT_FIELD_NAMESPACE,
    SECTIONS,
};
use crate::domains::shops::{SchemaRegistry, Shop};
use crate::kernel::retry::{retry_with_backoff, RetryPolicy};
use crate::kernel::shopify_client::{all_key_in_use, any_retryable, error_summary, user_errors};
use crate::kernel::BaseAdminApi;

/// Remote teardown of a deleted definition's dependents is asynchronous.
const DELETE_SETTLE: Duration = Duration::from_secs(2);
/// Extra wait before the single "key in use" create retry.
const KEY_IN_USE_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Every remote call below goes through this schedule.
const REMOTE_POLICY: RetryPolicy =
    RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(8))
        .with_timeout(Duration::from_secs(30));

const STOREFRONT_ACCESS: &str = "PUBLIC_READ";

/// What one full sync produced.
#[derive(Debug, Default)]
pub struct SyncOutcome {
    /// Type key (sections plus master) to remote definition id.
    pub definition_ids: BTreeMap<String, String>,
    pub product_field_definition_id: Option<String>,
}

/// Desired shape for one definition, built from the section registry.
#[derive(Debug, Clone)]
struct DesiredDefinition {
    type_key: String,
    name: String,
    fields: Vec<DesiredField>,
}

#[derive(Debug, Clone, PartialEq)]
struct DesiredField {
    key: String,
    name: String,
    type_name: String,
    validations: Vec<(String, String)>,
}

fn desired_for_section(section: &SectionSpec) -> DesiredDefinition {
    DesiredDefinition {
        type_key: section.key.to_string(),
        name: section.name.to_string(),
        fields: section
            .fields
            .iter()
            .map(|f| DesiredField {
                key: f.key.to_string(),
                name: f.name.to_string(),
                type_name: f.kind.type_name().to_string(),
                validations: Vec::new(),
            })
            .collect(),
    }
}

/// The master aggregate references one object per section; each reference
/// field is pinned to that section's definition id when we know it.
fn desired_for_master(definition_ids: &BTreeMap<String, String>) -> DesiredDefinition {
    DesiredDefinition {
        type_key: MASTER_TYPE.to_string(),
        name: MASTER_NAME.to_string(),
        fields: SECTIONS
            .iter()
            .map(|section| DesiredField {
                key: section.key.to_string(),
                name: section.name.to_string(),
                type_name: "metaobject_reference".to_string(),
                validations: definition_ids
                    .get(section.key)
                    .map(|id| vec![("metaobject_definition_id".to_string(), id.clone())])
                    .unwrap_or_default(),
            })
            .collect(),
    }
}

fn create_input(desired: &DesiredDefinition) -> Value {
    json!({
        "name": desired.name,
        "type": desired.type_key,
        "access": { "storefront": STOREFRONT_ACCESS },
        "capabilities": { "publishable": { "enabled": true } },
        "fieldDefinitions": desired
            .fields
            .iter()
            .map(|f| {
                let mut field = Map::new();
                field.insert("key".to_string(), json!(f.key));
                field.insert("name".to_string(), json!(f.name));
                field.insert("type".to_string(), json!(f.type_name));
                if !f.validations.is_empty() {
                    field.insert(
                        "validations".to_string(),
                        Value::Array(
                            f.validations
                                .iter()
                                .map(|(name, value)| json!({ "name": name, "value": value }))
                                .collect(),
                        ),
                    );
                }
                Value::Object(field)
            })
            .collect::<Vec<_>>(),
    })
}

#[derive(Debug, Clone)]
struct RemoteDefinition {
    id: String,
    name: String,
    storefront_access: String,
    fields: Vec<DesiredField>,
}

fn parse_remote_definition(node: &Value) -> Option<RemoteDefinition> {
    let id = node.get("id")?.as_str()?.to_string();
    let fields = node
        .pointer("/fieldDefinitions")
        .and_then(Value::as_array)
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| {
                    Some(DesiredField {
                        key: f.get("key")?.as_str()?.to_string(),
                        name: f.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
                        type_name: f
                            .pointer("/type/name")
                            .and_then(Value::as_str)
                            .unwrap_or("")
                            .to_string(),
                        validations: f
                            .get("validations")
                            .and_then(Value::as_array)
                            .map(|vals| {
                                vals.iter()
                                    .filter_map(|v| {
                                        Some((
                                            v.get("name")?.as_str()?.to_string(),
                                            v.get("value")?.as_str()?.to_string(),
                                        ))
                                    })
                                    .collect()
                            })
                            .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Some(RemoteDefinition {
        id,
        name: node.get("name").and_then(Value::as_str).unwrap_or("").to_string(),
        storefront_access: node
            .pointer("/access/storefront")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        fields,
    })
}

/// Diff an existing remote definition against the desired shape. Field
/// order is not significant; everything else (name, storefront access,
/// per-key name/type/validations, field set) is.
fn needs_update(existing: &RemoteDefinition, desired: &DesiredDefinition) -> bool {
    if existing.name != desired.name || existing.storefront_access != STOREFRONT_ACCESS {
        return true;
    }
    if existing.fields.len() != desired.fields.len() {
        return true;
    }
    for want in &desired.fields {
        let Some(have) = existing.fields.iter().find(|f| f.key == want.key) else {
            return true;
        };
        if have.name != want.name
            || have.type_name != want.type_name
            || have.validations != want.validations
        {
            return true;
        }
    }
    false
}

const DEFINITION_BY_TYPE_QUERY: &str = r#"
    query MetaobjectDefinitionByType($type: String!) {
        metaobjectDefinitionByType(type: $type) {
            id
            type
            name
            access {
                storefront
            }
            fieldDefinitions {
                key
                name
                type {
                    name
                }
                validations {
                    name
                    value
                }
            }
        }
    }
"#;

const DEFINITION_CREATE_MUTATION: &str = r#"
    mutation CreateMetaobjectDefinition($definition: MetaobjectDefinitionCreateInput!) {
        metaobjectDefinitionCreate(definition: $definition) {
            metaobjectDefinition {
                id
                type
                name
            }
            userErrors {
                field
                message
                code
            }
        }
    }
"#;

const DEFINITION_DELETE_MUTATION: &str = r#"
    mutation DeleteMetaobjectDefinition($id: ID!) {
        metaobjectDefinitionDelete(id: $id) {
            deletedId
            userErrors {
                field
                message
                code
            }
        }
    }
"#;

async fn fetch_definition(
    api: &dyn BaseAdminApi,
    type_key: &str,
) -> Result<Option<RemoteDefinition>> {
    let op_name = format!("fetch {type_key} definition");
    let data = retry_with_backoff(&REMOTE_POLICY, &op_name, || async move {
        api.graphql(DEFINITION_BY_TYPE_QUERY, json!({ "type": type_key }))
            .await
    })
    .await?;
    Ok(data
        .get("metaobjectDefinitionByType")
        .filter(|node| !node.is_null())
        .and_then(parse_remote_definition))
}

async fn create_definition(
    api: &dyn BaseAdminApi,
    desired: &DesiredDefinition,
) -> Result<CreateAttempt> {
    let input = create_input(desired);
    let op_name = format!("create {} definition", desired.type_key);
    let data = retry_with_backoff(&REMOTE_POLICY, &op_name, || {
        let input = input.clone();
        async move {
            let data = api
                .graphql(DEFINITION_CREATE_MUTATION, json!({ "definition": input }))
                .await?;
            let errors = user_errors(&data, "metaobjectDefinitionCreate");
            if any_retryable(&errors) {
                return Err(anyhow!("retryable errors: {}", error_summary(&errors)));
            }
            Ok(data)
        }
    })
    .await?;
    let errors = user_errors(&data, "metaobjectDefinitionCreate");
    if !errors.is_empty() {
        if all_key_in_use(&errors) {
            return Ok(CreateAttempt::KeyInUse);
        }
        if errors.iter().all(|e| e.is_idempotent_conflict()) {
            return Ok(CreateAttempt::AlreadyExists);
        }
        return Ok(CreateAttempt::Failed(error_summary(&errors)));
    }
    match data
        .pointer("/metaobjectDefinitionCreate/metaobjectDefinition/id")
        .and_then(Value::as_str)
    {
        Some(id) => Ok(CreateAttempt::Created(id.to_string())),
        None => Ok(CreateAttempt::AlreadyExists),
    }
}

enum CreateAttempt {
    Created(String),
    KeyInUse,
    AlreadyExists,
    Failed(String),
}

/// Reconcile one definition. Returns the remote id, or `None` when the
/// type could not be reconciled (already logged).
async fn ensure_definition(
    api: &dyn BaseAdminApi,
    desired: &DesiredDefinition,
) -> Result<Option<String>> {
    let type_key = desired.type_key.as_str();

    if let Some(existing) = fetch_definition(api, type_key).await? {
        if !needs_update(&existing, desired) {
            tracing::debug!(type_key, "Definition is up to date");
            return Ok(Some(existing.id));
        }

        tracing::info!(type_key, definition_id = %existing.id, "Definition outdated, recreating");
        let op_name = format!("delete {type_key} definition");
        let data = retry_with_backoff(&REMOTE_POLICY, &op_name, || {
            let id = existing.id.clone();
            async move {
                api.graphql(DEFINITION_DELETE_MUTATION, json!({ "id": id }))
                    .await
            }
        })
        .await?;
        let errors = user_errors(&data, "metaobjectDefinitionDelete");
        if !errors.is_empty() {
            tracing::error!(
                type_key,
                errors = %error_summary(&errors),
                "Could not delete outdated definition"
            );
            return Ok(None);
        }
        tokio::time::sleep(DELETE_SETTLE).await;
    }

    match create_definition(api, desired).await? {
        CreateAttempt::Created(id) => {
            tracing::info!(type_key, definition_id = %id, "Created definition");
            return Ok(Some(id));
        }
        CreateAttempt::AlreadyExists => {
            // Conflicting create lost a race; the winner's id serves.
            return Ok(fetch_definition(api, type_key).await?.map(|d| d.id));
        }
        CreateAttempt::Failed(errors) => {
            tracing::error!(type_key, errors = %errors, "Could not create definition");
            return Ok(None);
        }
        CreateAttempt::KeyInUse => {
            tracing::info!(type_key, "Definition key still in use, retrying create once");
        }
    }

    tokio::time::sleep(KEY_IN_USE_RETRY_DELAY).await;
    match create_definition(api, desired).await? {
        CreateAttempt::Created(id) => {
            tracing::info!(type_key, definition_id = %id, "Created definition on retry");
            Ok(Some(id))
        }
        CreateAttempt::AlreadyExists => Ok(fetch_definition(api, type_key).await?.map(|d| d.id)),
        CreateAttempt::KeyInUse | CreateAttempt::Failed(_) => {
            // A concurrent sync may have created it between our attempts.
            match fetch_definition(api, type_key).await? {
                Some(existing) => {
                    tracing::info!(
                        type_key,
                        definition_id = %existing.id,
                        "Found definition created concurrently"
                    );
                    Ok(Some(existing.id))
                }
                None => {
                    tracing::error!(type_key, "Definition create exhausted all attempts");
                    Ok(None)
                }
            }
        }
    }
}

const METAFIELD_DEFINITIONS_QUERY: &str = r#"
    query MetafieldDefinitions($ownerType: MetafieldOwnerType!, $namespace: String!, $key: String!) {
        metafieldDefinitions(ownerType: $ownerType, namespace: $namespace, key: $key, first: 1) {
            edges {
                node {
                    id
                    name
                    type {
                        name
                    }
                    validations {
                        name
                        value
                    }
                }
            }
        }
    }
"#;

const METAFIELD_DEFINITION_CREATE_MUTATION: &str = r#"
    mutation CreateMetafieldDefinition($definition: MetafieldDefinitionInput!) {
        metafieldDefinitionCreate(definition: $definition) {
            createdDefinition {
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

const METAFIELD_DEFINITION_UPDATE_MUTATION: &str = r#"
    mutation UpdateMetafieldDefinition($definition: MetafieldDefinitionUpdateInput!) {
        metafieldDefinitionUpdate(definition: $definition) {
            updatedDefinition {
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

const PRODUCT_FIELD_NAME: &str = "Master Sales Page";

/// Reconcile the product's master-reference field. Only callable once the
/// master type exists, since the validation pins its definition id.
async fn ensure_product_field(
    api: &dyn BaseAdminApi,
    master_definition_id: &str,
) -> Result<Option<String>> {
    let data = retry_with_backoff(&REMOTE_POLICY, "fetch product reference field", || async move {
        api.graphql(
            METAFIELD_DEFINITIONS_QUERY,
            json!({
                "ownerType": "PRODUCT",
                "namespace": PRODUCT_FIELD_NAMESPACE,
                "key": PRODUCT_FIELD_KEY,
            }),
        )
        .await
    })
    .await?;

    let existing = data
        .pointer("/metafieldDefinitions/edges/0/node")
        .filter(|node| !node.is_null())
        .cloned();

    if let Some(node) = &existing {
        let name_matches = node.get("name").and_then(Value::as_str) == Some(PRODUCT_FIELD_NAME);
        let type_matches =
            node.pointer("/type/name").and_then(Value::as_str) == Some("metaobject_reference");
        let validation_matches = node
            .pointer("/validations/0/value")
            .and_then(Value::as_str)
            == Some(master_definition_id);
        let id = node.get("id").and_then(Value::as_str).map(str::to_string);

        if name_matches && type_matches && validation_matches {
            tracing::debug!("Product reference field is up to date");
            return Ok(id);
        }

        if let Some(id) = id {
            let data = retry_with_backoff(
                &REMOTE_POLICY,
                "update product reference field",
                || async move {
                    let data = api
                        .graphql(
                            METAFIELD_DEFINITION_UPDATE_MUTATION,
                            json!({
                                "definition": {
                                    "ownerType": "PRODUCT",
                                    "namespace": PRODUCT_FIELD_NAMESPACE,
                                    "key": PRODUCT_FIELD_KEY,
                                    "name": PRODUCT_FIELD_NAME,
                                    "validations": [{
                                        "name": "metaobject_definition_id",
                                        "value": master_definition_id,
                                    }],
                                }
                            }),
                        )
                        .await?;
                    let errors = user_errors(&data, "metafieldDefinitionUpdate");
                    if any_retryable(&errors) {
                        return Err(anyhow!("retryable errors: {}", error_summary(&errors)));
                    }
                    Ok(data)
                },
            )
            .await?;
            let errors = user_errors(&data, "metafieldDefinitionUpdate");
            if !errors.is_empty() {
                tracing::error!(
                    errors = %error_summary(&errors),
                    "Could not update product reference field"
                );
                return Ok(None);
            }
            tracing::info!(definition_id = %id, "Updated product reference field");
            return Ok(Some(id));
        }
    }

    let data = retry_with_backoff(
        &REMOTE_POLICY,
        "create product reference field",
        || async move {
            let data = api
                .graphql(
                    METAFIELD_DEFINITION_CREATE_MUTATION,
                    json!({
                        "definition": {
                            "ownerType": "PRODUCT",
                            "namespace": PRODUCT_FIELD_NAMESPACE,
                            "key": PRODUCT_FIELD_KEY,
                            "name": PRODUCT_FIELD_NAME,
                            "description": "Reference to the master sales page object for this product",
                            "type": "metaobject_reference",
                            "validations": [{
                                "name": "metaobject_definition_id",
                                "value": master_definition_id,
                            }],
                        }
                    }),
                )
                .await?;
            let errors = user_errors(&data, "metafieldDefinitionCreate");
            if any_retryable(&errors) {
                return Err(anyhow!("retryable errors: {}", error_summary(&errors)));
            }
            Ok(data)
        },
    )
    .await?;
    let errors = user_errors(&data, "metafieldDefinitionCreate");
    if !errors.is_empty() {
        if errors.iter().all(|e| e.is_idempotent_conflict()) {
            tracing::info!("Product reference field already exists");
            return Ok(None);
        }
        tracing::error!(
            errors = %error_summary(&errors),
            "Could not create product reference field"
        );
        return Ok(None);
    }
    let id = data
        .pointer("/metafieldDefinitionCreate/createdDefinition/id")
        .and_then(Value::as_str)
        .map(str::to_string);
    if let Some(id) = &id {
        tracing::info!(definition_id = %id, "Created product reference field");
    }
    Ok(id)
}

/// Reconcile every definition against the remote catalog. Pure with
/// respect to our database; [`sync_schema`] persists the outcome.
pub async fn sync_definitions(api: &dyn BaseAdminApi) -> Result<SyncOutcome> {
    let mut outcome = SyncOutcome::default();

    for section in SECTIONS {
        let desired = desired_for_section(section);
        match ensure_definition(api, &desired).await {
            Ok(Some(id)) => {
                outcome.definition_ids.insert(section.key.to_string(), id);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::error!(
                    type_key = section.key,
                    error = format!("{err:#}"),
                    "Definition sync errored, continuing with remaining types"
                );
            }
        }
    }

    let master = desired_for_master(&outcome.definition_ids);
    match ensure_definition(api, &master).await {
        Ok(Some(id)) => {
            outcome.definition_ids.insert(MASTER_TYPE.to_string(), id);
        }
        Ok(None) => {}
        Err(err) => {
            tracing::error!(
                type_key = MASTER_TYPE,
                error = format!("{err:#}"),
                "Master definition sync errored"
            );
        }
    }

    if let Some(master_id) = outcome.definition_ids.get(MASTER_TYPE).cloned() {
        match ensure_product_field(api, &master_id).await {
            Ok(id) => outcome.product_field_definition_id = id,
            Err(err) => {
                tracing::error!(
                    error = format!("{err:#}"),
                    "Product reference field sync errored"
                );
            }
        }
    } else {
        tracing::warn!("Master definition unavailable, skipping product reference field");
    }

    tracing::info!(
        synced = outcome.definition_ids.len(),
        total = SECTIONS.len() + 1,
        "Schema sync finished"
    );
    Ok(outcome)
}

/// Reconcile the shop's schema and persist the resulting ids.
pub async fn sync_schema(
    api: &dyn BaseAdminApi,
    shop: &Shop,
    pool: &PgPool,
) -> Result<SchemaRegistry> {
    let outcome = sync_definitions(api).await?;
    let ids = Value::Object(
        outcome
            .definition_ids
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    );
    let registry = SchemaRegistry::upsert(
        shop.id,
        &ids,
        outcome.product_field_definition_id.as_deref(),
        pool,
    )
    .await?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_support::MockAdminApi;

    fn remote_node(desired: &DesiredDefinition, id: &str) -> Value {
        json!({
            "id": id,
            "type": desired.type_key,
            "name": desired.name,
            "access": { "storefront": "PUBLIC_READ" },
            "fieldDefinitions": desired.fields.iter().map(|f| json!({
                "key": f.key,
                "name": f.name,
                "type": { "name": f.type_name },
                "validations": f.validations.iter().map(|(n, v)| json!({
                    "name": n, "value": v
                })).collect::<Vec<_>>(),
            })).collect::<Vec<_>>(),
        })
    }

    #[test]
    fn unchanged_definition_needs_no_update() {
        let desired = desired_for_section(&SECTIONS[0]);
        let existing = parse_remote_definition(&remote_node(&desired, "gid://shopify/MetaobjectDefinition/1"))
            .unwrap();
        assert!(!needs_update(&existing, &desired));
    }

    #[test]
    fn changed_field_name_triggers_update() {
        let desired = desired_for_section(&SECTIONS[0]);
        let mut node = remote_node(&desired, "gid://shopify/MetaobjectDefinition/1");
        node["fieldDefinitions"][0]["name"] = json!("Renamed");
        let existing = parse_remote_definition(&node).unwrap();
        assert!(needs_update(&existing, &desired));
    }

    #[test]
    fn missing_validation_triggers_update() {
        let ids: BTreeMap<String, String> = SECTIONS
            .iter()
            .map(|s| (s.key.to_string(), format!("gid://shopify/MetaobjectDefinition/{}", s.key)))
            .collect();
        let desired = desired_for_master(&ids);
        let mut node = remote_node(&desired, "gid://shopify/MetaobjectDefinition/master");
        node["fieldDefinitions"][0]["validations"] = json!([]);
        let existing = parse_remote_definition(&node).unwrap();
        assert!(needs_update(&existing, &desired));
    }

    #[test]
    fn field_order_is_not_significant() {
        let desired = desired_for_section(&SECTIONS[0]);
        let mut node = remote_node(&desired, "gid://shopify/MetaobjectDefinition/1");
        let fields = node["fieldDefinitions"].as_array_mut().unwrap();
        fields.reverse();
        let existing = parse_remote_definition(&node).unwrap();
        assert!(!needs_update(&existing, &desired));
    }

    #[tokio::test]
    async fn second_sync_against_matching_remote_issues_no_writes() {
        // Every fetch finds a remote definition that already matches, so
        // the sync must never delete or create anything.
        let api = MockAdminApi::new(|query, vars| {
            if query.contains("metaobjectDefinitionByType") {
                let type_key = vars.get("type").and_then(Value::as_str).unwrap().to_string();
                let node = if type_key == MASTER_TYPE {
                    let ids: BTreeMap<String, String> = SECTIONS
                        .iter()
                        .map(|s| (s.key.to_string(), format!("gid://shopify/MetaobjectDefinition/{}", s.key)))
                        .collect();
                    remote_node(&desired_for_master(&ids), "gid://shopify/MetaobjectDefinition/master")
                } else {
                    let section = SECTIONS.iter().find(|s| s.key == type_key).unwrap();
                    remote_node(
                        &desired_for_section(section),
                        &format!("gid://shopify/MetaobjectDefinition/{type_key}"),
                    )
                };
                return Ok(json!({ "metaobjectDefinitionByType": node }));
            }
            if query.contains("metafieldDefinitions(") {
                return Ok(json!({
                    "metafieldDefinitions": { "edges": [{ "node": {
                        "id": "gid://shopify/MetafieldDefinition/9",
                        "name": "Master Sales Page",
                        "type": { "name": "metaobject_reference" },
                        "validations": [{
                            "name": "metaobject_definition_id",
                            "value": "gid://shopify/MetaobjectDefinition/master",
                        }],
                    }}]}
                }));
            }
            panic!("unexpected write during idempotent sync: {query}");
        });

        let outcome = sync_definitions(&api).await.unwrap();
        assert_eq!(outcome.definition_ids.len(), SECTIONS.len() + 1);
        assert_eq!(
            outcome.product_field_definition_id.as_deref(),
            Some("gid://shopify/MetafieldDefinition/9")
        );
        assert_eq!(api.count_calls("metaobjectDefinitionCreate"), 0);
        assert_eq!(api.count_calls("metaobjectDefinitionDelete"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn outdated_definition_is_recreated() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let fetches = Arc::new(AtomicUsize::new(0));
        let fetches_in_handler = fetches.clone();
        let api = MockAdminApi::new(move |query, vars| {
            if query.contains("metaobjectDefinitionByType") {
                let type_key = vars.get("type").and_then(Value::as_str).unwrap();
                if type_key != "dynamic_buy_box" {
                    return Ok(json!({ "metaobjectDefinitionByType": null }));
                }
                fetches_in_handler.fetch_add(1, Ordering::SeqCst);
                let mut node = remote_node(
                    &desired_for_section(&SECTIONS[0]),
                    "gid://shopify/MetaobjectDefinition/old",
                );
                node["name"] = json!("Stale Name");
                return Ok(json!({ "metaobjectDefinitionByType": node }));
            }
            if query.contains("metaobjectDefinitionDelete") {
                return Ok(json!({ "metaobjectDefinitionDelete": {
                    "deletedId": "gid://shopify/MetaobjectDefinition/old",
                    "userErrors": [],
                }}));
            }
            if query.contains("metaobjectDefinitionCreate") {
                let type_key = vars
                    .pointer("/definition/type")
                    .and_then(Value::as_str)
                    .unwrap()
                    .to_string();
                return Ok(json!({ "metaobjectDefinitionCreate": {
                    "metaobjectDefinition": {
                        "id": format!("gid://shopify/MetaobjectDefinition/new-{type_key}"),
                        "type": type_key,
                    },
                    "userErrors": [],
                }}));
            }
            if query.contains("metafieldDefinitions(") {
                return Ok(json!({ "metafieldDefinitions": { "edges": [] } }));
            }
            if query.contains("metafieldDefinitionCreate") {
                return Ok(json!({ "metafieldDefinitionCreate": {
                    "createdDefinition": { "id": "gid://shopify/MetafieldDefinition/new" },
                    "userErrors": [],
                }}));
            }
            panic!("unexpected call: {query}");
        });

        let outcome = sync_definitions(&api).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcome.definition_ids.get("dynamic_buy_box").map(String::as_str),
            Some("gid://shopify/MetaobjectDefinition/new-dynamic_buy_box")
        );
        assert_eq!(api.count_calls("metaobjectDefinitionDelete"), 1);
        // One create per section plus the master.
        assert_eq!(api.count_calls("metaobjectDefinitionCreate"), SECTIONS.len() + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_throttle_on_fetch_is_retried() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let fetches = Arc::new(AtomicUsize::new(0));
        let fetches_in_handler = fetches.clone();
        let api = MockAdminApi::new(move |query, _vars| {
            if query.contains("metaobjectDefinitionByType") {
                // First fetch hits a throttle; the retry finds no definition.
                if fetches_in_handler.fetch_add(1, Ordering::SeqCst) == 0 {
                    return Err(anyhow!("THROTTLED: exceeded cost limit"));
                }
                return Ok(json!({ "metaobjectDefinitionByType": null }));
            }
            if query.contains("metaobjectDefinitionCreate") {
                return Ok(json!({ "metaobjectDefinitionCreate": {
                    "metaobjectDefinition": {
                        "id": "gid://shopify/MetaobjectDefinition/guarantee",
                        "type": "guarantee",
                    },
                    "userErrors": [],
                }}));
            }
            panic!("unexpected call: {query}");
        });

        let section = SECTIONS.iter().find(|s| s.key == "guarantee").unwrap();
        let desired = desired_for_section(section);
        let id = ensure_definition(&api, &desired).await.unwrap();

        assert_eq!(id.as_deref(), Some("gid://shopify/MetaobjectDefinition/guarantee"));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn key_in_use_create_retries_once_then_refetches() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let creates = Arc::new(AtomicUsize::new(0));
        let creates_in_handler = creates.clone();
        let api = MockAdminApi::new(move |query, _vars| {
            if query.contains("metaobjectDefinitionByType") {
                let n = creates_in_handler.load(Ordering::SeqCst);
                if n >= 2 {
                    // The concurrent winner's definition shows up here.
                    let mut node = remote_node(
                        &desired_for_section(&SECTIONS[0]),
                        "gid://shopify/MetaobjectDefinition/winner",
                    );
                    node["name"] = json!("Stale Name");
                    return Ok(json!({ "metaobjectDefinitionByType": node }));
                }
                return Ok(json!({ "metaobjectDefinitionByType": null }));
            }
            if query.contains("metaobjectDefinitionCreate") {
                creates_in_handler.fetch_add(1, Ordering::SeqCst);
                return Ok(json!({ "metaobjectDefinitionCreate": {
                    "metaobjectDefinition": null,
                    "userErrors": [{ "message": "Key is in use", "code": "TAKEN" }],
                }}));
            }
            panic!("unexpected call: {query}");
        });

        let desired = desired_for_section(&SECTIONS[0]);
        let id = ensure_definition(&api, &desired).await.unwrap();
        assert_eq!(id.as_deref(), Some("gid://shopify/MetaobjectDefinition/winner"));
        assert_eq!(creates.load(Ordering::SeqCst), 2);
    }
}
