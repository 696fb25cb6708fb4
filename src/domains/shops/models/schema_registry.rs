use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;

/// Per-shop record of the catalog schema the synchronizer last installed.
/// `definition_ids` maps section type keys (plus the master type) to the
/// remote definition IDs.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SchemaRegistry {
    pub shop_id: i64,
    pub definition_ids: Value,
    pub product_field_definition_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl SchemaRegistry {
    /// Remote definition ID recorded for a section type, if any
    pub fn definition_id(&self, type_key: &str) -> Option<&str> {
        self.definition_ids.get(type_key).and_then(Value::as_str)
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl SchemaRegistry {
    /// Find the registry row for a shop
    pub async fn find_by_shop(shop_id: i64, pool: &PgPool) -> Result<Option<Self>> {
        let registry = sqlx::query_as::<_, SchemaRegistry>(
            "SELECT * FROM schema_registries WHERE shop_id = $1",
        )
        .bind(shop_id)
        .fetch_optional(pool)
        .await?;
        Ok(registry)
    }

    /// Record the outcome of a schema sync for a shop
    pub async fn upsert(
        shop_id: i64,
        definition_ids: &Value,
        product_field_definition_id: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        let registry = sqlx::query_as::<_, SchemaRegistry>(
            r#"
            INSERT INTO schema_registries (shop_id, definition_ids, product_field_definition_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (shop_id) DO UPDATE SET
                definition_ids = EXCLUDED.definition_ids,
                product_field_definition_id = EXCLUDED.product_field_definition_id,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(shop_id)
        .bind(definition_ids)
        .bind(product_field_definition_id)
        .fetch_one(pool)
        .await?;
        Ok(registry)
    }
}
