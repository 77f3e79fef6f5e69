//! In-memory capability implementations for tests and local tooling.
//!
//! They honour the same contracts as the Postgres adapters but live only as
//! long as the value, and expose a few inspection helpers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use catalog_media::{FetchedMedia, MediaError, MediaFetch, ObjectStore};

use crate::error::PipelineError;
use crate::ports::{EventQueue, IdAllocator, LockToken, MutationLock};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
pub struct MemoryIdAllocator {
    counters: Mutex<HashMap<String, i64>>,
}

impl MemoryIdAllocator {
    /// Allocator whose first id for any counter is `start + 1`.
    #[must_use]
    pub fn starting_at(counter: &str, start: i64) -> Self {
        let allocator = Self::default();
        lock(&allocator.counters).insert(counter.to_owned(), start);
        allocator
    }
}

#[async_trait]
impl IdAllocator for MemoryIdAllocator {
    async fn next_id(&self, counter: &str) -> Result<i64, PipelineError> {
        let mut counters = lock(&self.counters);
        let value = counters.entry(counter.to_owned()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

#[derive(Debug, Default)]
pub struct MemoryMutationLock {
    held: Mutex<HashMap<String, (LockToken, Instant)>>,
    unavailable: AtomicBool,
}

impl MemoryMutationLock {
    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        lock(&self.held)
            .get(key)
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }

    /// Make every subsequent acquire fail with a store error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl MutationLock for MemoryMutationLock {
    async fn try_acquire(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockToken>, PipelineError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(PipelineError::Capability("lock store unavailable".to_owned()));
        }
        let now = Instant::now();
        let mut held = lock(&self.held);
        if held.get(key).is_some_and(|(_, expires)| *expires > now) {
            return Ok(None);
        }
        let token = LockToken::generate();
        held.insert(key.to_owned(), (token, now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: LockToken) -> Result<bool, PipelineError> {
        let mut held = lock(&self.held);
        if held.get(key).is_some_and(|(holder, _)| *holder == token) {
            held.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

#[derive(Debug, Default)]
pub struct MemoryEventQueue {
    queues: Mutex<HashMap<String, VecDeque<serde_json::Value>>>,
}

impl MemoryEventQueue {
    /// Current contents of `queue`, oldest first, without consuming them.
    #[must_use]
    pub fn entries(&self, queue: &str) -> Vec<serde_json::Value> {
        lock(&self.queues)
            .get(queue)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self, queue: &str) -> usize {
        lock(&self.queues).get(queue).map_or(0, VecDeque::len)
    }

    #[must_use]
    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }
}

#[async_trait]
impl EventQueue for MemoryEventQueue {
    async fn push(&self, queue: &str, payload: serde_json::Value) -> Result<(), PipelineError> {
        lock(&self.queues)
            .entry(queue.to_owned())
            .or_default()
            .push_back(payload);
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<serde_json::Value>, PipelineError> {
        Ok(lock(&self.queues).get_mut(queue).and_then(VecDeque::pop_front))
    }

    async fn depth(&self, queue: &str) -> Result<usize, PipelineError> {
        Ok(self.len(queue))
    }
}

/// Serves registered URLs from memory; everything else is a 404.
#[derive(Debug, Default)]
pub struct MemoryMediaFetch {
    media: Mutex<HashMap<String, FetchedMedia>>,
}

impl MemoryMediaFetch {
    pub fn insert(&self, url: &str, bytes: &[u8], extension: &'static str) {
        lock(&self.media).insert(
            url.to_owned(),
            FetchedMedia {
                bytes: bytes.to_vec(),
                extension,
            },
        );
    }
}

#[async_trait]
impl MediaFetch for MemoryMediaFetch {
    async fn fetch(&self, url: &str) -> Result<FetchedMedia, MediaError> {
        lock(&self.media)
            .get(url)
            .cloned()
            .ok_or_else(|| MediaError::UnexpectedStatus {
                status: 404,
                url: url.to_owned(),
            })
    }
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        lock(&self.objects).get(key).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.objects).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bytes: &[u8], key: &str) -> Result<String, MediaError> {
        lock(&self.objects).insert(key.to_owned(), bytes.to_vec());
        Ok(format!("memory://{key}"))
    }
}
