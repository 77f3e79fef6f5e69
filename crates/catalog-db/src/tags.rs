//! Database operations for `tags` and `product_tags`.

use sqlx::PgConnection;

use crate::DbError;

/// Return the id of the live tag `name` in the shop, creating it if needed.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn find_or_create_tag(
    conn: &mut PgConnection,
    shop_id: i64,
    name: &str,
) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar::<_, i64>(
        "INSERT INTO tags (shop_id, name) VALUES ($1, $2) \
         ON CONFLICT (shop_id, name) WHERE NOT is_del \
         DO UPDATE SET updated_at = NOW() \
         RETURNING id",
    )
    .bind(shop_id)
    .bind(name)
    .fetch_one(conn)
    .await?)
}

/// Link a tag to a product unless a live link already exists.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn attach_tag(
    conn: &mut PgConnection,
    shop_id: i64,
    product_id: i64,
    tag_id: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO product_tags (shop_id, tag_id, product_id) VALUES ($1, $2, $3) \
         ON CONFLICT (product_id, tag_id) WHERE NOT is_del DO NOTHING",
    )
    .bind(shop_id)
    .bind(tag_id)
    .bind(product_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Soft-delete every live tag link of a product and return the detached
/// tag ids.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn detach_all_tags(
    conn: &mut PgConnection,
    shop_id: i64,
    product_id: i64,
) -> Result<Vec<i64>, DbError> {
    Ok(sqlx::query_scalar::<_, i64>(
        "UPDATE product_tags SET is_del = TRUE, updated_at = NOW() \
         WHERE shop_id = $1 AND product_id = $2 AND NOT is_del \
         RETURNING tag_id",
    )
    .bind(shop_id)
    .bind(product_id)
    .fetch_all(conn)
    .await?)
}
