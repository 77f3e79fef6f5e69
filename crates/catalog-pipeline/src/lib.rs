//! Product aggregate write/read pipeline.
//!
//! Writes go through [`AggregateWriter`] under a per-title
//! [`MutationGuard`], commit in one transaction, and hand their image URLs
//! to the background [`MediaReconciler`]. Reads are served by
//! [`ReadAggregator`]. [`CatalogPipeline`] wires the pieces together.

pub mod error;
pub mod events;
pub mod handler;
pub mod lock;
pub mod memory;
pub mod pg;
pub mod ports;
pub mod reader;
pub mod reconciler;
pub mod retry;
pub mod writer;

use std::sync::Arc;
use std::time::Duration;

use catalog_core::{AppConfig, NewProduct, ProductPatch};
use catalog_media::{HttpMediaFetcher, LocalObjectStore};
use sqlx::PgPool;

pub use error::PipelineError;
pub use events::{
    FailureKind, PendingMediaFailure, SyncEvent, SyncKind, TagCleanupHint, SYNC_QUEUE,
    TAG_CLEANUP_QUEUE,
};
pub use handler::{generate_unique, Handler};
pub use lock::{title_lock_key, MutationGuard};
pub use pg::{PgEventQueue, PgIdAllocator, PgMutationLock};
pub use ports::{EventQueue, IdAllocator, LockToken, MediaFetch, MutationLock, ObjectStore};
pub use reader::{ProductLookup, ProductPage, ReadAggregator};
pub use reconciler::{MediaReconciler, ReconcileReport, ReconcilerHandle};
pub use retry::RetryReport;
pub use writer::{content_hash, AggregateWriter, CreatedProduct, ID_COUNTER};

/// Capabilities injected into a [`CatalogPipeline`].
pub struct Capabilities {
    pub ids: Arc<dyn IdAllocator>,
    pub locks: Arc<dyn MutationLock>,
    pub events: Arc<dyn EventQueue>,
    pub fetcher: Arc<dyn MediaFetch>,
    pub store: Arc<dyn ObjectStore>,
}

/// Writer, reader and reconciler worker sharing one pool.
pub struct CatalogPipeline {
    writer: AggregateWriter,
    reader: ReadAggregator,
    reconciler: ReconcilerHandle,
}

impl CatalogPipeline {
    /// Build the pipeline with Postgres-backed counters, locks and queues,
    /// an HTTP media fetcher and a local object store. Must be called inside
    /// a Tokio runtime; the reconciler worker starts immediately.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Media`] if the HTTP client cannot be built.
    pub fn from_config(pool: PgPool, config: &AppConfig) -> Result<Self, PipelineError> {
        let fetcher = HttpMediaFetcher::new(
            config.media_fetch_timeout_secs,
            &config.media_user_agent,
            config.media_max_bytes,
        )?;
        let store = LocalObjectStore::new(config.storage_dir.clone(), &config.storage_public_url);
        let capabilities = Capabilities {
            ids: Arc::new(PgIdAllocator::new(pool.clone())),
            locks: Arc::new(PgMutationLock::new(pool.clone())),
            events: Arc::new(PgEventQueue::new(pool.clone())),
            fetcher: Arc::new(fetcher),
            store: Arc::new(store),
        };
        Ok(Self::new(
            pool,
            capabilities,
            Duration::from_secs(config.lock_ttl_secs),
        ))
    }

    /// Must be called inside a Tokio runtime.
    #[must_use]
    pub fn new(pool: PgPool, capabilities: Capabilities, lock_ttl: Duration) -> Self {
        let writer = AggregateWriter::new(
            pool.clone(),
            capabilities.ids,
            capabilities.locks,
            Arc::clone(&capabilities.events),
            lock_ttl,
        );
        let reconciler = MediaReconciler::new(
            pool.clone(),
            capabilities.fetcher,
            capabilities.store,
            capabilities.events,
        );
        Self {
            writer,
            reader: ReadAggregator::new(pool),
            reconciler: ReconcilerHandle::spawn(Arc::new(reconciler)),
        }
    }

    #[must_use]
    pub fn reader(&self) -> &ReadAggregator {
        &self.reader
    }

    #[must_use]
    pub fn reconciler(&self) -> &Arc<MediaReconciler> {
        self.reconciler.reconciler()
    }

    /// Create a product and queue its media. Returns once the aggregate is
    /// committed; media is reconciled in the background.
    ///
    /// # Errors
    ///
    /// See [`AggregateWriter::create_product`].
    pub async fn create_product(&self, input: NewProduct) -> Result<CreatedProduct, PipelineError> {
        let created = self.writer.create_product(input).await?;
        self.reconciler.submit(created.pending.clone()).await;
        Ok(created)
    }

    /// # Errors
    ///
    /// See [`AggregateWriter::update_product`].
    pub async fn update_product(
        &self,
        shop_id: i64,
        product_id: i64,
        patch: ProductPatch,
    ) -> Result<(), PipelineError> {
        let pending = self.writer.update_product(shop_id, product_id, patch).await?;
        self.reconciler.submit(pending).await;
        Ok(())
    }

    /// # Errors
    ///
    /// See [`AggregateWriter::delete_product`].
    pub async fn delete_product(&self, shop_id: i64, product_id: i64) -> Result<(), PipelineError> {
        self.writer.delete_product(shop_id, product_id).await
    }

    /// # Errors
    ///
    /// See [`MediaReconciler::retry_failed_media`].
    pub async fn retry_failed_media(&self, max_attempts: u32) -> Result<RetryReport, PipelineError> {
        self.reconciler().retry_failed_media(max_attempts).await
    }

    /// Stop the reconciler worker after its in-flight jobs finish.
    pub async fn shutdown(&self) {
        self.reconciler.shutdown().await;
    }
}
