//! Keyed integer counters backing id allocation.

use sqlx::PgPool;

use crate::DbError;

/// Atomically increment the counter `name` and return the new value.
///
/// A counter that does not exist yet starts at 1. The row lock taken by
/// the upsert serializes concurrent callers, so each receives a distinct
/// value.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn next_counter_value(pool: &PgPool, name: &str) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar::<_, i64>(
        "INSERT INTO id_counters (name, value) VALUES ($1, 1) \
         ON CONFLICT (name) DO UPDATE SET value = id_counters.value + 1 \
         RETURNING value",
    )
    .bind(name)
    .fetch_one(pool)
    .await?)
}
