use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Installed shop - credentials for the catalog's admin API
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Shop {
    pub id: i64,
    pub domain: Option<String>,
    pub myshopify_domain: String,
    #[serde(skip_serializing)]
    pub access_token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl Shop {
    /// Find shop by either its custom domain or its myshopify domain
    pub async fn find_by_domain(domain: &str, pool: &PgPool) -> Result<Option<Self>> {
        let shop = sqlx::query_as::<_, Shop>(
            "SELECT * FROM shops WHERE myshopify_domain = $1 OR domain = $1",
        )
        .bind(domain)
        .fetch_optional(pool)
        .await?;
        Ok(shop)
    }

    /// Find shop by ID
    pub async fn find_by_id(id: i64, pool: &PgPool) -> Result<Option<Self>> {
        let shop = sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(shop)
    }

    /// Oldest installed shop, used as the last-resort fallback when a
    /// request carries no usable shop hint
    pub async fn find_first(pool: &PgPool) -> Result<Option<Self>> {
        let shop = sqlx::query_as::<_, Shop>("SELECT * FROM shops ORDER BY created_at ASC LIMIT 1")
            .fetch_optional(pool)
            .await?;
        Ok(shop)
    }
}
