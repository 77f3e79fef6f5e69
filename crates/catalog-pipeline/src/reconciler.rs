//! Post-commit media reconciliation.
//!
//! Turns the image URLs a write left behind into image rows bound to the
//! product and its variants. Every URL is handled on its own: a failure is
//! logged, pushed to the failure queue for its role, and never affects the
//! other URLs or the committed aggregate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};

use catalog_core::PendingMedia;
use catalog_db::{DbError, NewImage};
use catalog_media::{fingerprint, object_key, probe_width};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};

use crate::error::PipelineError;
use crate::events::{emit, FailureKind, PendingMediaFailure};
use crate::ports::{EventQueue, MediaFetch, ObjectStore};

/// Jobs buffered between `submit` and the worker.
const JOB_BUFFER: usize = 256;

/// Counts for one reconciliation job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub stored: usize,
    pub failed: usize,
}

pub struct MediaReconciler {
    pub(crate) pool: PgPool,
    fetcher: Arc<dyn MediaFetch>,
    store: Arc<dyn ObjectStore>,
    pub(crate) events: Arc<dyn EventQueue>,
}

impl MediaReconciler {
    #[must_use]
    pub fn new(
        pool: PgPool,
        fetcher: Arc<dyn MediaFetch>,
        store: Arc<dyn ObjectStore>,
        events: Arc<dyn EventQueue>,
    ) -> Self {
        Self {
            pool,
            fetcher,
            store,
            events,
        }
    }

    /// Fetch, fingerprint, store and record one URL. Returns the image id;
    /// a URL whose content is already stored for the shop yields the
    /// existing id.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Media`] for fetch or storage failures and
    /// [`PipelineError::Store`] if the image row cannot be written.
    pub async fn persist_url(&self, shop_id: i64, url: &str) -> Result<i64, PipelineError> {
        let media = self.fetcher.fetch(url).await?;
        let fingerprint = fingerprint(&media.bytes);
        let width = probe_width(&media.bytes, media.extension);
        let key = object_key(&fingerprint, media.extension);
        let src = self.store.put(&media.bytes, &key).await?;
        let image_id = catalog_db::upsert_image(
            &self.pool,
            &NewImage {
                shop_id,
                fingerprint: &fingerprint,
                file_key: &key,
                src: &src,
                width,
            },
        )
        .await?;
        tracing::debug!(shop_id, url, image_id, "media persisted");
        Ok(image_id)
    }

    /// Persist `url` and append it to the product's image list.
    pub(crate) async fn persist_product_image(
        &self,
        shop_id: i64,
        product_id: i64,
        url: &str,
    ) -> Result<i64, PipelineError> {
        let image_id = self.persist_url(shop_id, url).await?;
        catalog_db::append_image_id(&self.pool, shop_id, product_id, image_id).await?;
        Ok(image_id)
    }

    /// Run one job to completion.
    pub async fn reconcile(&self, job: PendingMedia) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let shop_id = job.shop_id;
        let product_id = job.product_id;
        let product_urls: HashSet<&str> = job.image_urls.iter().map(String::as_str).collect();

        let mut resolved: HashMap<String, i64> = HashMap::new();
        let mut first_stored: Option<i64> = None;
        for url in job.distinct_urls() {
            match self.persist_product_image(shop_id, product_id, &url).await {
                Ok(image_id) => {
                    report.stored += 1;
                    first_stored.get_or_insert(image_id);
                    resolved.insert(url, image_id);
                }
                Err(e) => {
                    tracing::warn!(shop_id, product_id, url = %url, error = %e, "product image failed");
                    if product_urls.contains(url.as_str()) {
                        report.failed += 1;
                        self.record_failure(FailureKind::ProductImage, shop_id, product_id, None, &url)
                            .await;
                    }
                }
            }
        }

        self.resolve_default(&job, &resolved, first_stored, &mut report)
            .await;

        for variant in &job.variant_images {
            let bound = match resolved.get(&variant.url) {
                Some(image_id) => catalog_db::set_variant_image(
                    &self.pool,
                    shop_id,
                    variant.variant_id,
                    *image_id,
                )
                .await
                .map_err(PipelineError::from),
                None => Err(PipelineError::not_found("image")),
            };
            if let Err(e) = bound {
                tracing::warn!(
                    shop_id,
                    product_id,
                    variant_id = variant.variant_id,
                    url = %variant.url,
                    error = %e,
                    "variant image failed"
                );
                report.failed += 1;
                self.record_failure(
                    FailureKind::VariantImage,
                    shop_id,
                    product_id,
                    Some(variant.variant_id),
                    &variant.url,
                )
                .await;
            }
        }

        tracing::info!(
            shop_id,
            product_id,
            stored = report.stored,
            failed = report.failed,
            "media reconciled"
        );
        report
    }

    /// Bind the default image: the designated URL if it resolved, else the
    /// first stored image. Without a designated URL the first stored image
    /// is only used when the product has no default yet. A designated URL
    /// that did not resolve is queued even when the fallback was bound.
    async fn resolve_default(
        &self,
        job: &PendingMedia,
        resolved: &HashMap<String, i64>,
        first_stored: Option<i64>,
        report: &mut ReconcileReport,
    ) {
        let (shop_id, product_id) = (job.shop_id, job.product_id);
        let designated = job.default_image_url.as_deref();
        let designated_id = designated.and_then(|url| resolved.get(url).copied());

        let candidate = match (designated, designated_id) {
            (_, Some(image_id)) => Some(image_id),
            (Some(_), None) => first_stored,
            (None, None) => match first_stored {
                Some(image_id) => self.unset_default(shop_id, product_id).await.then_some(image_id),
                None => None,
            },
        };

        let mut bound = false;
        if let Some(image_id) = candidate {
            match catalog_db::set_default_image(&self.pool, shop_id, product_id, image_id).await {
                Ok(()) => bound = designated_id.is_some(),
                Err(e) => tracing::warn!(shop_id, product_id, image_id, error = %e, "default image failed"),
            }
        }

        if let Some(url) = designated {
            if !bound {
                report.failed += 1;
                self.record_failure(FailureKind::DefaultImage, shop_id, product_id, None, url)
                    .await;
            }
        }
    }

    /// Whether the product exists and has no default image yet.
    async fn unset_default(&self, shop_id: i64, product_id: i64) -> bool {
        match catalog_db::find_product(&self.pool, shop_id, product_id).await {
            Ok(Some(row)) => row.default_image_id == 0,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(shop_id, product_id, error = %e, "default image check failed");
                false
            }
        }
    }

    pub(crate) async fn record_failure(
        &self,
        kind: FailureKind,
        shop_id: i64,
        product_id: i64,
        variant_id: Option<i64>,
        url: &str,
    ) {
        let failure = PendingMediaFailure {
            shop_id,
            product_id,
            variant_id,
            url: url.to_owned(),
            attempts: 0,
        };
        self.push_failure(kind, &failure).await;
    }

    pub(crate) async fn push_failure(&self, kind: FailureKind, failure: &PendingMediaFailure) {
        if !emit(self.events.as_ref(), kind.queue(), failure).await {
            tracing::error!(
                shop_id = failure.shop_id,
                product_id = failure.product_id,
                url = %failure.url,
                "media failure could not be queued and is lost"
            );
        }
    }

    /// Queue every URL of a job that never ran.
    async fn record_unprocessed(&self, job: &PendingMedia) {
        let (shop_id, product_id) = (job.shop_id, job.product_id);
        for url in &job.image_urls {
            self.record_failure(FailureKind::ProductImage, shop_id, product_id, None, url)
                .await;
        }
        if let Some(url) = &job.default_image_url {
            self.record_failure(FailureKind::DefaultImage, shop_id, product_id, None, url)
                .await;
        }
        for variant in &job.variant_images {
            self.record_failure(
                FailureKind::VariantImage,
                shop_id,
                product_id,
                Some(variant.variant_id),
                &variant.url,
            )
            .await;
        }
    }
}

/// True when a store error means the target row is gone rather than the
/// store being unavailable.
pub(crate) fn is_gone(error: &PipelineError) -> bool {
    matches!(
        error,
        PipelineError::NotFound { .. } | PipelineError::Store(DbError::NotFound)
    )
}

/// Handle to the background reconciliation worker.
///
/// Jobs run on a dedicated task, detached from the request that submitted
/// them. [`ReconcilerHandle::shutdown`] stops intake and waits for every
/// in-flight job.
pub struct ReconcilerHandle {
    reconciler: Arc<MediaReconciler>,
    sender: Mutex<Option<mpsc::Sender<PendingMedia>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ReconcilerHandle {
    /// Start the worker on the current runtime.
    #[must_use]
    pub fn spawn(reconciler: Arc<MediaReconciler>) -> Self {
        let (sender, receiver) = mpsc::channel(JOB_BUFFER);
        let worker = tokio::spawn(run_worker(Arc::clone(&reconciler), receiver));
        Self {
            reconciler,
            sender: Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    #[must_use]
    pub fn reconciler(&self) -> &Arc<MediaReconciler> {
        &self.reconciler
    }

    /// Queue a job without waiting for it. If the worker is gone or its
    /// buffer is full, every URL goes straight to its failure queue.
    pub async fn submit(&self, job: PendingMedia) {
        if job.is_empty() {
            return;
        }
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let rejected = match sender {
            Some(sender) => match sender.try_send(job) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Full(job) | mpsc::error::TrySendError::Closed(job)) => job,
            },
            None => job,
        };
        tracing::warn!(
            shop_id = rejected.shop_id,
            product_id = rejected.product_id,
            "reconciler unavailable, queueing media as failed"
        );
        self.reconciler.record_unprocessed(&rejected).await;
    }

    /// Stop accepting jobs and wait for the in-flight ones.
    pub async fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "reconciler worker panicked");
            }
        }
        tracing::info!("media reconciler stopped");
    }
}

async fn run_worker(reconciler: Arc<MediaReconciler>, mut receiver: mpsc::Receiver<PendingMedia>) {
    let mut jobs = JoinSet::new();
    loop {
        tokio::select! {
            next = receiver.recv() => match next {
                Some(job) => {
                    let reconciler = Arc::clone(&reconciler);
                    jobs.spawn(async move { reconciler.reconcile(job).await });
                }
                None => break,
            },
            Some(done) = jobs.join_next(), if !jobs.is_empty() => log_job(done),
        }
    }
    while let Some(done) = jobs.join_next().await {
        log_job(done);
    }
}

fn log_job(done: Result<ReconcileReport, JoinError>) {
    if let Err(e) = done {
        tracing::error!(error = %e, "reconciliation job panicked");
    }
}
