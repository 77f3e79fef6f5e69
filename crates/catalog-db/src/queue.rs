//! Durable append-only queues in `queue_entries`.
//!
//! Producers append JSON payloads under a queue name; consumers pop the
//! oldest entry. Popping deletes the row, so a consumer that fails after
//! popping must push the entry back itself.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueueEntryRow {
    pub id: i64,
    pub queue: String,
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

/// Append `payload` to `queue` and return the entry id.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn push_queue_entry(
    pool: &PgPool,
    queue: &str,
    payload: &serde_json::Value,
) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar::<_, i64>(
        "INSERT INTO queue_entries (queue, payload) VALUES ($1, $2) RETURNING id",
    )
    .bind(queue)
    .bind(payload)
    .fetch_one(pool)
    .await?)
}

/// Remove and return the oldest entry of `queue`.
///
/// Rows locked by a concurrent consumer are skipped rather than waited on.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn pop_queue_entry(pool: &PgPool, queue: &str) -> Result<Option<QueueEntryRow>, DbError> {
    Ok(sqlx::query_as::<_, QueueEntryRow>(
        "DELETE FROM queue_entries WHERE id = ( \
           SELECT id FROM queue_entries WHERE queue = $1 \
           ORDER BY id LIMIT 1 FOR UPDATE SKIP LOCKED) \
         RETURNING id, queue, payload, enqueued_at",
    )
    .bind(queue)
    .fetch_optional(pool)
    .await?)
}

/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn queue_len(pool: &PgPool, queue: &str) -> Result<i64, DbError> {
    Ok(
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM queue_entries WHERE queue = $1")
            .bind(queue)
            .fetch_one(pool)
            .await?,
    )
}
