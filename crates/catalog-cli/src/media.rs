//! Media failure queue commands.
//!
//! `retry` performs the same drain the server scheduler runs on its cron, so
//! operators can flush the queues by hand after an outage.

use catalog_core::AppConfig;
use catalog_pipeline::{CatalogPipeline, FailureKind};
use clap::Subcommand;
use sqlx::PgPool;

/// Sub-commands available under `media`.
#[derive(Debug, Subcommand)]
pub enum MediaCommands {
    /// Re-run every queued media failure once
    Retry {
        /// Drop an entry after this many attempts (defaults to config)
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Show how many failures are queued per role
    Status,
}

/// Dispatch a `media` sub-command.
///
/// # Errors
///
/// Returns an error if the pipeline cannot be built or a queue cannot be read.
pub(crate) async fn run(
    pool: PgPool,
    config: &AppConfig,
    command: MediaCommands,
) -> anyhow::Result<()> {
    match command {
        MediaCommands::Retry { max_attempts } => {
            let max_attempts = max_attempts.unwrap_or(config.retry_max_attempts);
            let pipeline = CatalogPipeline::from_config(pool, config)?;
            let report = pipeline.retry_failed_media(max_attempts).await?;
            pipeline.shutdown().await;
            println!(
                "retried {} | succeeded {} | requeued {} | dropped {}",
                report.retried, report.succeeded, report.requeued, report.dropped
            );
        }
        MediaCommands::Status => {
            for kind in FailureKind::ALL {
                let len = catalog_db::queue_len(&pool, kind.queue()).await?;
                println!("{:<40} {len}", kind.queue());
            }
        }
    }
    Ok(())
}
