use std::sync::Arc;
use std::time::Duration;

use crate::error::PipelineError;
use crate::ports::{LockToken, MutationLock};

#[must_use]
pub fn title_lock_key(shop_id: i64, title: &str) -> String {
    format!("catalog:lock:product-title:{shop_id}:{title}")
}

/// A held mutation lock.
///
/// Call [`MutationGuard::release`] on the success path. On every other exit
/// (early return, panic, the owning future being dropped) `Drop` schedules a
/// release on the current tokio runtime; if there is none, the TTL expires
/// the lock instead.
pub struct MutationGuard {
    locks: Arc<dyn MutationLock>,
    key: String,
    token: Option<LockToken>,
}

impl MutationGuard {
    /// Probe `key` once.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Contention`] if the lock is held elsewhere or
    /// the lock store fails.
    pub async fn acquire(
        locks: Arc<dyn MutationLock>,
        key: String,
        ttl: Duration,
    ) -> Result<Self, PipelineError> {
        match locks.try_acquire(&key, ttl).await {
            Ok(Some(token)) => Ok(Self {
                locks,
                key,
                token: Some(token),
            }),
            Ok(None) => {
                tracing::info!(key = %key, "mutation lock already held");
                Err(PipelineError::Contention)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "mutation lock acquire failed");
                Err(PipelineError::Contention)
            }
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn release(mut self) {
        if let Some(token) = self.token.take() {
            release_logged(self.locks.as_ref(), &self.key, token).await;
        }
    }
}

impl Drop for MutationGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let locks = Arc::clone(&self.locks);
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    release_logged(locks.as_ref(), &key, token).await;
                });
            }
            Err(_) => {
                tracing::warn!(key = %key, "no runtime to release mutation lock, leaving it to expire");
            }
        }
    }
}

async fn release_logged(locks: &dyn MutationLock, key: &str, token: LockToken) {
    match locks.release(key, token).await {
        Ok(true) => tracing::debug!(key, "mutation lock released"),
        Ok(false) => tracing::warn!(key, "mutation lock expired before release"),
        Err(e) => tracing::warn!(key, error = %e, "mutation lock release failed"),
    }
}
