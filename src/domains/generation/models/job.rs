use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// A job that sat in `in_progress` longer than this never got its webhook
/// and is considered lost.
pub const STALE_JOB_TIMEOUT: TimeDelta = TimeDelta::minutes(25);

/// Error message stamped on jobs the reaper times out.
pub const STALE_JOB_ERROR: &str = "Job timed out - no response received within 25 minutes";

/// Generation job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "generation_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Generation job - tracks one content-generation workflow run
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GenerationJob {
    pub id: Uuid,
    pub product_id: String,
    pub shop_id: i64,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl GenerationJob {
    /// Create a job already in `in_progress`: the dispatcher hands it to the
    /// workflow engine immediately after this insert
    pub async fn create(product_id: &str, shop_id: i64, pool: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, GenerationJob>(
            r#"
            INSERT INTO generation_jobs (product_id, shop_id, status, started_at)
            VALUES ($1, $2, 'in_progress', NOW())
            RETURNING *
            "#,
        )
        .bind(product_id)
        .bind(shop_id)
        .fetch_one(pool)
        .await?;
        Ok(job)
    }

    /// Find job by ID
    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, GenerationJob>("SELECT * FROM generation_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(job)
    }

    /// Mark job completed, clearing any error left by an earlier attempt
    pub async fn mark_completed(&self, pool: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, GenerationJob>(
            r#"
            UPDATE generation_jobs
            SET status = 'completed', completed_at = NOW(), error_message = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .fetch_one(pool)
        .await?;
        Ok(job)
    }

    /// Mark job failed with an error message
    pub async fn mark_failed(&self, error_message: &str, pool: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, GenerationJob>(
            r#"
            UPDATE generation_jobs
            SET status = 'failed', completed_at = NOW(), error_message = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(error_message)
        .fetch_one(pool)
        .await?;
        Ok(job)
    }

    /// Fail every in-progress job that started before `cutoff` in one
    /// statement, returning the jobs that were swept
    pub async fn fail_stale(cutoff: DateTime<Utc>, pool: &PgPool) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, GenerationJob>(
            r#"
            UPDATE generation_jobs
            SET status = 'failed', completed_at = NOW(), error_message = $2, updated_at = NOW()
            WHERE status = 'in_progress' AND started_at < $1
            RETURNING *
            "#,
        )
        .bind(cutoff)
        .bind(STALE_JOB_ERROR)
        .fetch_all(pool)
        .await?;
        Ok(jobs)
    }
}
