//! Database operations for the `products` table.

use catalog_core::{Pagination, ProductListFilter};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};

use crate::DbError;

const PRODUCT_COLUMNS: &str = "id, shop_id, title, sub_title, price, compare_at_price, weight, \
     weight_unit, default_sku_code, seo_title, seo_desc, requires_shipping, is_use_stock, \
     soldout_policy, product_stock, handler, handler_origin, image_ids, default_image_id, \
     attribute, youtube_video_url, youtube_video_pos, source, status, published_at, is_del, \
     created_at, updated_at";

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub shop_id: i64,
    pub title: String,
    pub sub_title: String,
    pub price: Decimal,
    pub compare_at_price: Decimal,
    pub weight: Decimal,
    pub weight_unit: String,
    pub default_sku_code: String,
    pub seo_title: String,
    pub seo_desc: String,
    pub requires_shipping: bool,
    pub is_use_stock: bool,
    pub soldout_policy: Option<String>,
    pub product_stock: i64,
    pub handler: String,
    pub handler_origin: String,
    /// Comma-joined ordered image ids.
    pub image_ids: String,
    pub default_image_id: i64,
    pub attribute: Option<String>,
    pub youtube_video_url: String,
    pub youtube_video_pos: String,
    pub source: String,
    /// `1` published, `2` unpublished.
    pub status: i16,
    pub published_at: Option<DateTime<Utc>>,
    pub is_del: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column values for a freshly allocated product.
#[derive(Debug, Clone)]
pub struct NewProductRow<'a> {
    pub id: i64,
    pub shop_id: i64,
    pub title: &'a str,
    pub sub_title: &'a str,
    pub price: Decimal,
    pub compare_at_price: Decimal,
    pub weight: Decimal,
    pub weight_unit: &'a str,
    pub default_sku_code: &'a str,
    pub seo_title: &'a str,
    pub seo_desc: &'a str,
    pub requires_shipping: bool,
    pub is_use_stock: bool,
    pub soldout_policy: Option<&'a str>,
    pub product_stock: i64,
    pub handler: &'a str,
    pub handler_origin: &'a str,
    pub attribute: Option<&'a str>,
    pub youtube_video_url: &'a str,
    pub youtube_video_pos: &'a str,
    pub source: &'a str,
    pub status: i16,
}

/// Sparse column update. Only `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct ProductUpdate {
    pub title: Option<String>,
    pub handler: Option<String>,
    pub handler_origin: Option<String>,
    pub sub_title: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub weight_unit: Option<String>,
    pub default_sku_code: Option<String>,
    pub seo_title: Option<String>,
    pub seo_desc: Option<String>,
    pub requires_shipping: Option<bool>,
    pub is_use_stock: Option<bool>,
    pub soldout_policy: Option<String>,
    pub product_stock: Option<i64>,
    pub attribute: Option<String>,
    pub youtube_video_url: Option<String>,
    pub youtube_video_pos: Option<String>,
    /// Setting `1` stamps `published_at` if unset; `2` clears it.
    pub status: Option<i16>,
    pub image_ids: Option<String>,
    pub default_image_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert a product row with an empty image list and `default_image_id = 0`.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn insert_product(conn: &mut PgConnection, row: &NewProductRow<'_>) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO products \
           (id, shop_id, title, sub_title, price, compare_at_price, weight, weight_unit, \
            default_sku_code, seo_title, seo_desc, requires_shipping, is_use_stock, \
            soldout_policy, product_stock, handler, handler_origin, image_ids, default_image_id, \
            attribute, youtube_video_url, youtube_video_pos, source, status, published_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
                 '', 0, $18, $19, $20, $21, $22, CASE WHEN $22 = 1 THEN NOW() END)",
    )
    .bind(row.id)
    .bind(row.shop_id)
    .bind(row.title)
    .bind(row.sub_title)
    .bind(row.price)
    .bind(row.compare_at_price)
    .bind(row.weight)
    .bind(row.weight_unit)
    .bind(row.default_sku_code)
    .bind(row.seo_title)
    .bind(row.seo_desc)
    .bind(row.requires_shipping)
    .bind(row.is_use_stock)
    .bind(row.soldout_policy)
    .bind(row.product_stock)
    .bind(row.handler)
    .bind(row.handler_origin)
    .bind(row.attribute)
    .bind(row.youtube_video_url)
    .bind(row.youtube_video_pos)
    .bind(row.source)
    .bind(row.status)
    .execute(conn)
    .await?;
    Ok(())
}

/// Apply a sparse update to a live product. Returns rows affected (0 or 1).
///
/// `updated_at` is always bumped.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn update_product(
    conn: &mut PgConnection,
    shop_id: i64,
    product_id: i64,
    update: &ProductUpdate,
) -> Result<u64, DbError> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE products SET updated_at = NOW()");

    macro_rules! set_if_some {
        ($field:ident) => {
            if let Some(value) = &update.$field {
                qb.push(concat!(", ", stringify!($field), " = "));
                qb.push_bind(value.clone());
            }
        };
    }

    set_if_some!(title);
    set_if_some!(handler);
    set_if_some!(handler_origin);
    set_if_some!(sub_title);
    set_if_some!(price);
    set_if_some!(compare_at_price);
    set_if_some!(weight);
    set_if_some!(weight_unit);
    set_if_some!(default_sku_code);
    set_if_some!(seo_title);
    set_if_some!(seo_desc);
    set_if_some!(requires_shipping);
    set_if_some!(is_use_stock);
    set_if_some!(soldout_policy);
    set_if_some!(product_stock);
    set_if_some!(attribute);
    set_if_some!(youtube_video_url);
    set_if_some!(youtube_video_pos);
    set_if_some!(image_ids);
    set_if_some!(default_image_id);

    if let Some(status) = update.status {
        qb.push(", status = ").push_bind(status);
        if status == 1 {
            qb.push(", published_at = COALESCE(published_at, NOW())");
        } else {
            qb.push(", published_at = NULL");
        }
    }

    qb.push(" WHERE shop_id = ")
        .push_bind(shop_id)
        .push(" AND id = ")
        .push_bind(product_id)
        .push(" AND NOT is_del");

    let result = qb.build().execute(conn).await?;
    Ok(result.rows_affected())
}

/// Soft-delete a product. Returns rows affected (0 or 1).
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn soft_delete_product(
    conn: &mut PgConnection,
    shop_id: i64,
    product_id: i64,
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE products SET is_del = TRUE, updated_at = NOW() \
         WHERE shop_id = $1 AND id = $2 AND NOT is_del",
    )
    .bind(shop_id)
    .bind(product_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Append `image_id` to the product's `image_ids` unless already present.
///
/// Returns `true` if the list changed. The membership check and append run
/// in one statement, so concurrent appends to the same product never drop
/// an id.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn append_image_id(
    pool: &PgPool,
    shop_id: i64,
    product_id: i64,
    image_id: i64,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE products SET \
           image_ids = CASE WHEN image_ids = '' THEN $3::TEXT ELSE image_ids || ',' || $3::TEXT END, \
           updated_at = NOW() \
         WHERE shop_id = $1 AND id = $2 AND NOT is_del \
           AND NOT ($3::TEXT = ANY(string_to_array(image_ids, ',')))",
    )
    .bind(shop_id)
    .bind(product_id)
    .bind(image_id.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Set `default_image_id` on a live product.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product does not exist or is
/// deleted, or [`DbError::Sqlx`] on query failure.
pub async fn set_default_image(
    pool: &PgPool,
    shop_id: i64,
    product_id: i64,
    image_id: i64,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE products SET default_image_id = $3, updated_at = NOW() \
         WHERE shop_id = $1 AND id = $2 AND NOT is_del",
    )
    .bind(shop_id)
    .bind(product_id)
    .bind(image_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetch a live product by id.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn find_product(
    executor: impl PgExecutor<'_>,
    shop_id: i64,
    product_id: i64,
) -> Result<Option<ProductRow>, DbError> {
    let sql = format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE shop_id = $1 AND id = $2 AND NOT is_del"
    );
    Ok(sqlx::query_as::<_, ProductRow>(&sql)
        .bind(shop_id)
        .bind(product_id)
        .fetch_optional(executor)
        .await?)
}

/// Fetch a live product by handler.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn find_product_by_handler(
    pool: &PgPool,
    shop_id: i64,
    handler: &str,
) -> Result<Option<ProductRow>, DbError> {
    Ok(find_live_by_handler(pool, shop_id, handler).await?)
}

/// Newest live product holding exactly `handler`, used by slug collision
/// checks.
///
/// # Errors
///
/// Returns [`sqlx::Error`] on database query failure.
pub async fn find_live_by_handler(
    pool: &PgPool,
    shop_id: i64,
    handler: &str,
) -> Result<Option<ProductRow>, sqlx::Error> {
    let sql = format!(
        "SELECT {PRODUCT_COLUMNS} FROM products \
         WHERE shop_id = $1 AND handler = $2 AND NOT is_del \
         ORDER BY id DESC LIMIT 1"
    );
    sqlx::query_as::<_, ProductRow>(&sql)
        .bind(shop_id)
        .bind(handler)
        .fetch_optional(pool)
        .await
}

/// Count live products in the shop sharing `handler_origin`.
///
/// # Errors
///
/// Returns [`sqlx::Error`] on database query failure.
pub async fn count_by_handler_origin(
    pool: &PgPool,
    shop_id: i64,
    handler_origin: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM products \
         WHERE shop_id = $1 AND handler_origin = $2 AND NOT is_del",
    )
    .bind(shop_id)
    .bind(handler_origin)
    .fetch_one(pool)
    .await
}

/// One page of live products matching `filter`, newest first.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn list_products(
    pool: &PgPool,
    shop_id: i64,
    filter: &ProductListFilter,
    page: Pagination,
) -> Result<Vec<ProductRow>, DbError> {
    let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
    push_list_filter(&mut qb, shop_id, filter);
    qb.push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(page.offset());

    Ok(qb.build_query_as::<ProductRow>().fetch_all(pool).await?)
}

/// Total live products matching `filter`, ignoring paging.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn count_products(
    pool: &PgPool,
    shop_id: i64,
    filter: &ProductListFilter,
) -> Result<i64, DbError> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
    push_list_filter(&mut qb, shop_id, filter);
    Ok(qb.build_query_scalar::<i64>().fetch_one(pool).await?)
}

fn push_list_filter(qb: &mut QueryBuilder<'_, Postgres>, shop_id: i64, filter: &ProductListFilter) {
    qb.push(" WHERE shop_id = ").push_bind(shop_id).push(" AND NOT is_del");

    if let Some(since_id) = filter.since_id {
        qb.push(" AND id > ").push_bind(since_id);
    }
    if !filter.ids.is_empty() {
        qb.push(" AND id = ANY(").push_bind(filter.ids.clone()).push(")");
    }

    let ranges = [
        ("created_at", ">=", filter.created_at_min),
        ("created_at", "<=", filter.created_at_max),
        ("updated_at", ">=", filter.updated_at_min),
        ("updated_at", "<=", filter.updated_at_max),
        ("published_at", ">=", filter.published_at_min),
        ("published_at", "<=", filter.published_at_max),
    ];
    for (column, op, bound) in ranges {
        if let Some(bound) = bound {
            qb.push(format!(" AND {column} {op} ")).push_bind(bound);
        }
    }

    if let Some(status) = filter.published_status.status_code() {
        qb.push(" AND status = ").push_bind(status);
    }
    if let Some(title) = filter.title.as_deref().filter(|t| !t.is_empty()) {
        qb.push(" AND title LIKE ")
            .push_bind(format!("{}%", escape_like(title)));
    }
    if !filter.handlers.is_empty() {
        qb.push(" AND handler = ANY(")
            .push_bind(filter.handlers.clone())
            .push(")");
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
