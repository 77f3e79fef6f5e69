//! TTL locks in `mutation_locks`, with `SET NX EX` semantics.

use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// Take `key` for `ttl_secs` seconds if it is free or its holder expired.
///
/// Returns `true` when `token` now holds the lock. Never waits.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn try_acquire_lock(
    pool: &PgPool,
    key: &str,
    token: Uuid,
    ttl_secs: u64,
) -> Result<bool, DbError> {
    #[allow(clippy::cast_precision_loss)]
    let ttl = ttl_secs as f64;
    let acquired = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO mutation_locks (key, token, expires_at) \
         VALUES ($1, $2, NOW() + make_interval(secs => $3::DOUBLE PRECISION)) \
         ON CONFLICT (key) DO UPDATE SET \
           token      = EXCLUDED.token, \
           expires_at = EXCLUDED.expires_at \
         WHERE mutation_locks.expires_at <= NOW() \
         RETURNING token",
    )
    .bind(key)
    .bind(token)
    .bind(ttl)
    .fetch_optional(pool)
    .await?;
    Ok(acquired.is_some())
}

/// Release `key` if `token` still holds it. Returns `true` if a row was
/// removed; a lock that expired and was re-taken by someone else is left
/// alone.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn release_lock(pool: &PgPool, key: &str, token: Uuid) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM mutation_locks WHERE key = $1 AND token = $2")
        .bind(key)
        .bind(token)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
