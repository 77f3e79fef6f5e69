//! Database operations for `product_details`, the 1:1 body table.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgExecutor, PgPool};

use crate::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DetailRow {
    pub product_id: i64,
    pub body_html: String,
    pub content_hash: String,
    pub updated_at: DateTime<Utc>,
}

/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn upsert_detail(
    conn: &mut PgConnection,
    product_id: i64,
    body_html: &str,
    content_hash: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO product_details (product_id, body_html, content_hash) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (product_id) DO UPDATE SET \
           body_html    = EXCLUDED.body_html, \
           content_hash = EXCLUDED.content_hash, \
           updated_at   = NOW()",
    )
    .bind(product_id)
    .bind(body_html)
    .bind(content_hash)
    .execute(conn)
    .await?;
    Ok(())
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if the product has no detail row, or
/// [`DbError::Sqlx`] on query failure.
pub async fn find_detail(pool: &PgPool, product_id: i64) -> Result<DetailRow, DbError> {
    sqlx::query_as::<_, DetailRow>(
        "SELECT product_id, body_html, content_hash, updated_at \
         FROM product_details WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Stored body hash, `None` if no detail row exists yet.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn find_content_hash(
    executor: impl PgExecutor<'_>,
    product_id: i64,
) -> Result<Option<String>, DbError> {
    Ok(sqlx::query_scalar::<_, String>(
        "SELECT content_hash FROM product_details WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_optional(executor)
    .await?)
}
