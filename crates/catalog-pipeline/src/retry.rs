//! Retry drain for media failure queues.

use serde::Serialize;

use crate::error::PipelineError;
use crate::events::{FailureKind, PendingMediaFailure};
use crate::reconciler::{is_gone, MediaReconciler};

/// Outcome of one pass over every failure queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryReport {
    pub retried: usize,
    pub succeeded: usize,
    pub requeued: usize,
    pub dropped: usize,
}

impl MediaReconciler {
    /// Re-run every queued media failure once.
    ///
    /// Each queue is consumed one entry at a time, up to the depth it had
    /// when the pass reached it, so entries pushed back during the pass wait
    /// for the next one and at most one entry is ever out of the queue. An
    /// entry that fails is requeued with its attempt count bumped until it
    /// reaches `max_attempts`, then dropped with an error log. Entries whose
    /// product or variant no longer exists are dropped immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Capability`] if a queue cannot be read.
    /// Entries not yet popped stay queued.
    pub async fn retry_failed_media(&self, max_attempts: u32) -> Result<RetryReport, PipelineError> {
        let mut report = RetryReport::default();
        for kind in FailureKind::ALL {
            let depth = self.events.depth(kind.queue()).await?;
            for _ in 0..depth {
                let Some(value) = self.events.pop(kind.queue()).await? else {
                    break;
                };
                let failure = match serde_json::from_value::<PendingMediaFailure>(value) {
                    Ok(failure) => failure,
                    Err(e) => {
                        tracing::error!(queue = kind.queue(), error = %e, "discarding malformed media failure");
                        continue;
                    }
                };
                self.retry_entry(kind, failure, max_attempts, &mut report)
                    .await;
            }
        }
        tracing::info!(
            retried = report.retried,
            succeeded = report.succeeded,
            requeued = report.requeued,
            dropped = report.dropped,
            "media retry pass complete"
        );
        Ok(report)
    }

    async fn retry_entry(
        &self,
        kind: FailureKind,
        failure: PendingMediaFailure,
        max_attempts: u32,
        report: &mut RetryReport,
    ) {
        report.retried += 1;
        match self.retry_one(kind, &failure).await {
            Ok(()) => report.succeeded += 1,
            Err(e) if is_gone(&e) => {
                tracing::warn!(
                    queue = kind.queue(),
                    product_id = failure.product_id,
                    url = %failure.url,
                    "target gone, dropping media failure"
                );
                report.dropped += 1;
            }
            Err(e) => {
                let attempts = failure.attempts.saturating_add(1);
                if attempts >= max_attempts {
                    tracing::error!(
                        queue = kind.queue(),
                        product_id = failure.product_id,
                        url = %failure.url,
                        attempts,
                        error = %e,
                        "media failure exhausted retries"
                    );
                    report.dropped += 1;
                } else {
                    tracing::warn!(
                        queue = kind.queue(),
                        product_id = failure.product_id,
                        url = %failure.url,
                        attempts,
                        error = %e,
                        "media retry failed"
                    );
                    let next = PendingMediaFailure {
                        attempts,
                        ..failure
                    };
                    self.push_failure(kind, &next).await;
                    report.requeued += 1;
                }
            }
        }
    }

    async fn retry_one(&self, kind: FailureKind, failure: &PendingMediaFailure) -> Result<(), PipelineError> {
        let (shop_id, product_id) = (failure.shop_id, failure.product_id);
        if catalog_db::find_product(&self.pool, shop_id, product_id)
            .await?
            .is_none()
        {
            return Err(PipelineError::not_found("product"));
        }

        let image_id = self
            .persist_product_image(shop_id, product_id, &failure.url)
            .await?;
        match kind {
            FailureKind::ProductImage => Ok(()),
            FailureKind::DefaultImage => {
                catalog_db::set_default_image(&self.pool, shop_id, product_id, image_id).await?;
                Ok(())
            }
            FailureKind::VariantImage => {
                let variant_id = failure
                    .variant_id
                    .ok_or(PipelineError::not_found("variant"))?;
                catalog_db::set_variant_image(&self.pool, shop_id, variant_id, image_id).await?;
                Ok(())
            }
        }
    }
}
