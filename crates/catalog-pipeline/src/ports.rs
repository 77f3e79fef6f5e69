//! Capabilities the pipeline consumes, injected as trait objects so tests
//! can substitute the in-memory versions from [`crate::memory`].

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::PipelineError;

pub use catalog_media::{MediaFetch, ObjectStore};

/// Proof of holding a mutation lock. Only the holder's token releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockToken(pub Uuid);

impl LockToken {
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Atomically incrementing named counters.
#[async_trait]
pub trait IdAllocator: Send + Sync {
    /// # Errors
    ///
    /// Any error is fatal to the write that asked for the id.
    async fn next_id(&self, counter: &str) -> Result<i64, PipelineError>;
}

/// Non-blocking keyed TTL locks.
#[async_trait]
pub trait MutationLock: Send + Sync {
    /// Probe once. `Ok(None)` means somebody else holds `key`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the lock store cannot be reached.
    async fn try_acquire(&self, key: &str, ttl: Duration)
        -> Result<Option<LockToken>, PipelineError>;

    /// Release `key` if `token` still holds it. Returns whether it did.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the lock store cannot be reached.
    async fn release(&self, key: &str, token: LockToken) -> Result<bool, PipelineError>;
}

/// Durable named queues of JSON payloads, consumed oldest first.
#[async_trait]
pub trait EventQueue: Send + Sync {
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the queue store cannot be reached.
    async fn push(&self, queue: &str, payload: serde_json::Value) -> Result<(), PipelineError>;

    /// # Errors
    ///
    /// Returns [`PipelineError`] if the queue store cannot be reached.
    async fn pop(&self, queue: &str) -> Result<Option<serde_json::Value>, PipelineError>;

    /// Number of entries currently waiting on `queue`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the queue store cannot be reached.
    async fn depth(&self, queue: &str) -> Result<usize, PipelineError>;
}
