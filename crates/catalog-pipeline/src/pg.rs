//! Postgres-backed implementations of the pipeline capabilities.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::PipelineError;
use crate::ports::{EventQueue, IdAllocator, LockToken, MutationLock};

#[derive(Debug, Clone)]
pub struct PgIdAllocator {
    pool: PgPool,
}

impl PgIdAllocator {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdAllocator for PgIdAllocator {
    async fn next_id(&self, counter: &str) -> Result<i64, PipelineError> {
        Ok(catalog_db::next_counter_value(&self.pool, counter).await?)
    }
}

#[derive(Debug, Clone)]
pub struct PgMutationLock {
    pool: PgPool,
}

impl PgMutationLock {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MutationLock for PgMutationLock {
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, PipelineError> {
        let token = LockToken::generate();
        let held = catalog_db::try_acquire_lock(&self.pool, key, token.0, ttl.as_secs()).await?;
        Ok(held.then_some(token))
    }

    async fn release(&self, key: &str, token: LockToken) -> Result<bool, PipelineError> {
        Ok(catalog_db::release_lock(&self.pool, key, token.0).await?)
    }
}

#[derive(Debug, Clone)]
pub struct PgEventQueue {
    pool: PgPool,
}

impl PgEventQueue {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventQueue for PgEventQueue {
    async fn push(&self, queue: &str, payload: serde_json::Value) -> Result<(), PipelineError> {
        catalog_db::push_queue_entry(&self.pool, queue, &payload).await?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<serde_json::Value>, PipelineError> {
        Ok(catalog_db::pop_queue_entry(&self.pool, queue)
            .await?
            .map(|entry| entry.payload))
    }

    async fn depth(&self, queue: &str) -> Result<usize, PipelineError> {
        let len = catalog_db::queue_len(&self.pool, queue).await?;
        Ok(usize::try_from(len).unwrap_or(0))
    }
}
