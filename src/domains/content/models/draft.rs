use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

/// Draft lifecycle status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "content_draft_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    ReadyForReview,
    Published,
}

/// Content draft - one per generation job, holds the AI output in both its
/// raw and normalized forms
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentDraft {
    pub id: Uuid,
    pub generation_job_id: Uuid,
    pub product_id: String,
    pub shop_id: i64,
    pub raw_content: Value,
    pub processed_content: Value,
    pub status: DraftStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl ContentDraft {
    /// Create the draft for a generation job, or replace its content if the
    /// workflow engine delivered the same run twice. Either way the draft
    /// lands in `ready_for_review`.
    pub async fn upsert_for_job(
        generation_job_id: Uuid,
        product_id: &str,
        shop_id: i64,
        raw_content: &Value,
        processed_content: &Value,
        pool: &PgPool,
    ) -> Result<Self> {
        let draft = sqlx::query_as::<_, ContentDraft>(
            r#"
            INSERT INTO content_drafts
                (generation_job_id, product_id, shop_id, raw_content, processed_content, status)
            VALUES ($1, $2, $3, $4, $5, 'ready_for_review')
            ON CONFLICT (generation_job_id) DO UPDATE SET
                raw_content = EXCLUDED.raw_content,
                processed_content = EXCLUDED.processed_content,
                status = 'ready_for_review',
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(generation_job_id)
        .bind(product_id)
        .bind(shop_id)
        .bind(raw_content)
        .bind(processed_content)
        .fetch_one(pool)
        .await?;
        Ok(draft)
    }

    /// Persist a rewritten processed document (image URLs swapped for file
    /// references after upload)
    pub async fn update_processed_content(
        &self,
        processed_content: &Value,
        pool: &PgPool,
    ) -> Result<Self> {
        let draft = sqlx::query_as::<_, ContentDraft>(
            r#"
            UPDATE content_drafts
            SET processed_content = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(processed_content)
        .fetch_one(pool)
        .await?;
        Ok(draft)
    }

    /// Mark the draft published
    pub async fn mark_published(&self, pool: &PgPool) -> Result<Self> {
        let draft = sqlx::query_as::<_, ContentDraft>(
            r#"
            UPDATE content_drafts
            SET status = 'published', published_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .fetch_one(pool)
        .await?;
        Ok(draft)
    }
}
