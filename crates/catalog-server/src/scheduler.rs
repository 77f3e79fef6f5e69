//! Background job scheduler.
//!
//! Registers the recurring media retry job against the shared pipeline.

use std::sync::Arc;

use catalog_core::AppConfig;
use catalog_pipeline::CatalogPipeline;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

/// Builds and starts the background job scheduler.
///
/// The returned handle must be kept alive for the lifetime of the process.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the cron expression is rejected, or the scheduler fails to start.
pub async fn build_scheduler(
    pipeline: Arc<CatalogPipeline>,
    config: Arc<AppConfig>,
) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_media_retry_job(&scheduler, pipeline, &config).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Replays queued media failures on `config.retry_cron`.
async fn register_media_retry_job(
    scheduler: &JobScheduler,
    pipeline: Arc<CatalogPipeline>,
    config: &AppConfig,
) -> Result<(), JobSchedulerError> {
    let max_attempts = config.retry_max_attempts;

    let job = Job::new_async(config.retry_cron.as_str(), move |_uuid, _lock| {
        let pipeline = Arc::clone(&pipeline);

        Box::pin(async move {
            tracing::info!("scheduler: starting media retry run");
            match pipeline.retry_failed_media(max_attempts).await {
                Ok(report) => tracing::info!(
                    retried = report.retried,
                    succeeded = report.succeeded,
                    requeued = report.requeued,
                    dropped = report.dropped,
                    "scheduler: media retry run complete"
                ),
                Err(e) => tracing::error!(error = %e, "scheduler: media retry run failed"),
            }
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
