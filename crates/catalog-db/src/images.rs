//! Database operations for the `images` table.

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};

use crate::DbError;

/// A row from the `images` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImageRow {
    pub id: i64,
    pub shop_id: i64,
    /// Hex SHA-256 of the stored bytes.
    pub fingerprint: String,
    pub file_key: String,
    pub src: String,
    pub width: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewImage<'a> {
    pub shop_id: i64,
    pub fingerprint: &'a str,
    pub file_key: &'a str,
    pub src: &'a str,
    pub width: i32,
}

/// Insert an image, or return the existing live image with the same
/// fingerprint in the shop.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn upsert_image(pool: &PgPool, image: &NewImage<'_>) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar::<_, i64>(
        "INSERT INTO images (shop_id, fingerprint, file_key, src, width) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (shop_id, fingerprint) WHERE NOT is_del \
         DO UPDATE SET updated_at = NOW() \
         RETURNING id",
    )
    .bind(image.shop_id)
    .bind(image.fingerprint)
    .bind(image.file_key)
    .bind(image.src)
    .bind(image.width)
    .fetch_one(pool)
    .await?)
}

/// # Errors
///
/// Returns [`DbError::NotFound`] if no live image has this id in the shop,
/// or [`DbError::Sqlx`] on query failure.
pub async fn find_image(pool: &PgPool, shop_id: i64, image_id: i64) -> Result<ImageRow, DbError> {
    sqlx::query_as::<_, ImageRow>(
        "SELECT id, shop_id, fingerprint, file_key, src, width, created_at \
         FROM images WHERE shop_id = $1 AND id = $2 AND NOT is_del",
    )
    .bind(shop_id)
    .bind(image_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Live images among `ids`, in no particular order.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn list_images_by_ids(
    pool: &PgPool,
    shop_id: i64,
    ids: &[i64],
) -> Result<Vec<ImageRow>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(sqlx::query_as::<_, ImageRow>(
        "SELECT id, shop_id, fingerprint, file_key, src, width, created_at \
         FROM images WHERE shop_id = $1 AND id = ANY($2::BIGINT[]) AND NOT is_del",
    )
    .bind(shop_id)
    .bind(ids)
    .fetch_all(pool)
    .await?)
}

/// Subset of `ids` that are live images in the shop.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn live_image_ids(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
    ids: &[i64],
) -> Result<Vec<i64>, DbError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    Ok(sqlx::query_scalar::<_, i64>(
        "SELECT id FROM images WHERE shop_id = $1 AND id = ANY($2::BIGINT[]) AND NOT is_del",
    )
    .bind(shop_id)
    .bind(ids)
    .fetch_all(executor)
    .await?)
}
