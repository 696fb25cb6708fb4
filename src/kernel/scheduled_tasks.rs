//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! One periodic task runs here: the stale generation job sweep. The
//! dispatcher never blocks on the workflow engine, so a job whose webhook
//! never arrives would sit in `in_progress` forever without this sweep.
//!
//! ```text
//! Scheduler (every 10 minutes)
//!     │
//!     └─► fail_stale(now - 25min)
//!             └─► each stale job → status=failed, timeout error message
//! ```
//!
//! The sweep is idempotent - a failed job no longer matches the stale
//! filter, so back-to-back runs find nothing new. It races benignly with
//! the webhook correlator: a late webhook for a reaped job still saves its
//! content but never flips the job back to completed.

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::generation::models::{GenerationJob, STALE_JOB_TIMEOUT};

/// Start all scheduled tasks
pub async fn start_scheduler(pool: PgPool) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    // Stale job sweep - runs every 10 minutes
    let sweep_pool = pool.clone();
    let sweep_job = Job::new_async("0 */10 * * * *", move |_uuid, _lock| {
        let pool = sweep_pool.clone();
        Box::pin(async move {
            if let Err(e) = run_stale_job_sweep(&pool).await {
                tracing::error!("Stale job sweep failed: {}", e);
            }
        })
    })?;

    scheduler.add(sweep_job).await?;
    scheduler.start().await?;

    tracing::info!("Scheduled tasks started (stale job sweep every 10 minutes)");
    Ok(scheduler)
}

/// Fail jobs stuck in `in_progress` past the timeout threshold.
pub async fn run_stale_job_sweep(pool: &PgPool) -> Result<()> {
    let cutoff = Utc::now() - STALE_JOB_TIMEOUT;
    let failed = GenerationJob::fail_stale(cutoff, pool).await?;

    if failed.is_empty() {
        // Only log when jobs are found to reduce noise
        return Ok(());
    }

    for job in &failed {
        let stale_minutes = job
            .started_at
            .map(|started| (Utc::now() - started).num_minutes())
            .unwrap_or_default();
        tracing::info!(
            job_id = %job.id,
            product_id = %job.product_id,
            stale_minutes,
            "Marked stale generation job as failed"
        );
    }

    tracing::info!(total_failed = failed.len(), "Completed stale job sweep");
    Ok(())
}
