//! Database operations for the `product_variants` table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgExecutor, PgPool, Postgres, QueryBuilder};

use crate::DbError;

/// A row from the `product_variants` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VariantRow {
    pub id: i64,
    pub shop_id: i64,
    pub product_id: i64,
    pub title: String,
    pub sku_code: String,
    pub price: Decimal,
    pub compare_at_price: Decimal,
    pub weight: Decimal,
    pub weight_unit: String,
    pub requires_shipping: bool,
    pub inventory_quantity: i64,
    /// `0` when no image is bound.
    pub image_id: i64,
    pub spec: String,
    pub options: String,
    pub sort: i32,
    pub is_checked: bool,
    /// `false` only for the synthesized catch-all variant.
    pub is_show: bool,
    pub is_del: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVariantRow<'a> {
    pub id: i64,
    pub shop_id: i64,
    pub product_id: i64,
    pub title: &'a str,
    pub sku_code: &'a str,
    pub price: Decimal,
    pub compare_at_price: Decimal,
    pub weight: Decimal,
    pub weight_unit: &'a str,
    pub requires_shipping: bool,
    pub inventory_quantity: i64,
    pub spec: &'a str,
    pub options: &'a str,
    pub sort: i32,
    pub is_checked: bool,
    pub is_show: bool,
}

/// Sparse variant update. Only `Some` fields are written.
#[derive(Debug, Clone, Default)]
pub struct VariantUpdate {
    pub title: Option<String>,
    pub sku_code: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub weight_unit: Option<String>,
    pub requires_shipping: Option<bool>,
    pub inventory_quantity: Option<i64>,
    pub spec: Option<String>,
    pub options: Option<String>,
    pub sort: Option<i32>,
    pub is_checked: Option<bool>,
}

impl VariantUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.sku_code.is_none()
            && self.price.is_none()
            && self.compare_at_price.is_none()
            && self.weight.is_none()
            && self.weight_unit.is_none()
            && self.requires_shipping.is_none()
            && self.inventory_quantity.is_none()
            && self.spec.is_none()
            && self.options.is_none()
            && self.sort.is_none()
            && self.is_checked.is_none()
    }
}

/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn insert_variant(conn: &mut PgConnection, row: &NewVariantRow<'_>) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO product_variants \
           (id, shop_id, product_id, title, sku_code, price, compare_at_price, weight, \
            weight_unit, requires_shipping, inventory_quantity, spec, options, sort, \
            is_checked, is_show) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
    )
    .bind(row.id)
    .bind(row.shop_id)
    .bind(row.product_id)
    .bind(row.title)
    .bind(row.sku_code)
    .bind(row.price)
    .bind(row.compare_at_price)
    .bind(row.weight)
    .bind(row.weight_unit)
    .bind(row.requires_shipping)
    .bind(row.inventory_quantity)
    .bind(row.spec)
    .bind(row.options)
    .bind(row.sort)
    .bind(row.is_checked)
    .bind(row.is_show)
    .execute(conn)
    .await?;
    Ok(())
}

/// Update a live variant of `product_id` in place. Returns rows affected.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn update_variant(
    conn: &mut PgConnection,
    product_id: i64,
    variant_id: i64,
    update: &VariantUpdate,
) -> Result<u64, DbError> {
    let mut qb = QueryBuilder::<Postgres>::new("UPDATE product_variants SET updated_at = NOW()");

    if let Some(v) = &update.title {
        qb.push(", title = ").push_bind(v.clone());
    }
    if let Some(v) = &update.sku_code {
        qb.push(", sku_code = ").push_bind(v.clone());
    }
    if let Some(v) = update.price {
        qb.push(", price = ").push_bind(v);
    }
    if let Some(v) = update.compare_at_price {
        qb.push(", compare_at_price = ").push_bind(v);
    }
    if let Some(v) = update.weight {
        qb.push(", weight = ").push_bind(v);
    }
    if let Some(v) = &update.weight_unit {
        qb.push(", weight_unit = ").push_bind(v.clone());
    }
    if let Some(v) = update.requires_shipping {
        qb.push(", requires_shipping = ").push_bind(v);
    }
    if let Some(v) = update.inventory_quantity {
        qb.push(", inventory_quantity = ").push_bind(v);
    }
    if let Some(v) = &update.spec {
        qb.push(", spec = ").push_bind(v.clone());
    }
    if let Some(v) = &update.options {
        qb.push(", options = ").push_bind(v.clone());
    }
    if let Some(v) = update.sort {
        qb.push(", sort = ").push_bind(v);
    }
    if let Some(v) = update.is_checked {
        qb.push(", is_checked = ").push_bind(v);
    }

    qb.push(" WHERE product_id = ")
        .push_bind(product_id)
        .push(" AND id = ")
        .push_bind(variant_id)
        .push(" AND NOT is_del");

    Ok(qb.build().execute(conn).await?.rows_affected())
}

/// Soft-delete every live variant of `product_id` whose id is not in `keep`.
///
/// An empty `keep` deletes all of them. Returns the number of rows deleted.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn soft_delete_variants_except(
    conn: &mut PgConnection,
    product_id: i64,
    keep: &[i64],
) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE product_variants SET is_del = TRUE, updated_at = NOW() \
         WHERE product_id = $1 AND NOT is_del AND id != ALL($2::BIGINT[])",
    )
    .bind(product_id)
    .bind(keep)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Live variants of a product in display order.
///
/// # Errors
///
/// Returns [`DbError`] on database query failure.
pub async fn list_variants(
    executor: impl PgExecutor<'_>,
    product_id: i64,
) -> Result<Vec<VariantRow>, DbError> {
    Ok(sqlx::query_as::<_, VariantRow>(
        "SELECT id, shop_id, product_id, title, sku_code, price, compare_at_price, weight, \
                weight_unit, requires_shipping, inventory_quantity, image_id, spec, options, \
                sort, is_checked, is_show, is_del, created_at, updated_at \
         FROM product_variants \
         WHERE product_id = $1 AND NOT is_del \
         ORDER BY sort, id",
    )
    .bind(product_id)
    .fetch_all(executor)
    .await?)
}

/// Bind an image to a live variant.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the variant does not exist or is
/// deleted, or [`DbError::Sqlx`] on query failure.
pub async fn set_variant_image(
    pool: &PgPool,
    shop_id: i64,
    variant_id: i64,
    image_id: i64,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE product_variants SET image_id = $3, updated_at = NOW() \
         WHERE shop_id = $1 AND id = $2 AND NOT is_del",
    )
    .bind(shop_id)
    .bind(variant_id)
    .bind(image_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
