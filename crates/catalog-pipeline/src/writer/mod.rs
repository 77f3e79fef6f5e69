//! Transactional writes of the product aggregate.
//!
//! Each operation validates its input, takes the title lock when the title
//! is involved, allocates ids, and then writes every row of the aggregate
//! in one transaction. Sync events go out only after commit. Image URLs are
//! never fetched here; they come back as [`PendingMedia`] for the
//! reconciler.

mod create;
mod delete;
mod update;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use catalog_core::{spec_to_string, PendingMedia, VariantInput, VariantSpec};
use catalog_db::{DbError, NewVariantRow};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use sqlx::{PgConnection, PgPool};

use crate::events::{emit, SyncEvent, SyncKind, TagCleanupHint, SYNC_QUEUE, TAG_CLEANUP_QUEUE};
use crate::ports::{EventQueue, IdAllocator, MutationLock};

/// Counter shared by product and variant ids.
pub const ID_COUNTER: &str = "catalog_auto_increment";

const DEFAULT_WEIGHT_UNIT: &str = "kg";

/// Result of a committed create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedProduct {
    pub product_id: i64,
    pub handler: String,
    pub pending: PendingMedia,
}

pub struct AggregateWriter {
    pool: PgPool,
    ids: Arc<dyn IdAllocator>,
    locks: Arc<dyn MutationLock>,
    events: Arc<dyn EventQueue>,
    lock_ttl: Duration,
}

impl AggregateWriter {
    #[must_use]
    pub fn new(
        pool: PgPool,
        ids: Arc<dyn IdAllocator>,
        locks: Arc<dyn MutationLock>,
        events: Arc<dyn EventQueue>,
        lock_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            ids,
            locks,
            events,
            lock_ttl,
        }
    }

    async fn emit_sync(&self, shop_id: i64, product_id: i64, event: SyncKind) {
        let payload = SyncEvent {
            shop_id,
            product_id,
            event,
        };
        emit(self.events.as_ref(), SYNC_QUEUE, &payload).await;
    }

    async fn emit_tag_cleanup(&self, shop_id: i64, tag_ids: impl IntoIterator<Item = i64>) {
        for tag_id in tag_ids {
            let hint = TagCleanupHint { shop_id, tag_id };
            emit(self.events.as_ref(), TAG_CLEANUP_QUEUE, &hint).await;
        }
    }
}

/// Hex SHA-256 of a detail body, compared to skip unchanged writes.
#[must_use]
pub fn content_hash(body: &str) -> String {
    format!("{:x}", Sha256::digest(body.as_bytes()))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// 1-based display position.
fn position(index: usize) -> i32 {
    i32::try_from(index + 1).unwrap_or(i32::MAX)
}

/// Trimmed, non-empty, first occurrence wins.
fn clean_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && seen.insert(*t))
        .map(ToOwned::to_owned)
        .collect()
}

async fn attach_tags(
    conn: &mut PgConnection,
    shop_id: i64,
    product_id: i64,
    tags: &[String],
) -> Result<Vec<i64>, DbError> {
    let mut attached = Vec::with_capacity(tags.len());
    for name in clean_tags(tags) {
        let tag_id = catalog_db::find_or_create_tag(conn, shop_id, &name).await?;
        catalog_db::attach_tag(conn, shop_id, product_id, tag_id).await?;
        attached.push(tag_id);
    }
    Ok(attached)
}

/// A variant row to insert, with owned fields.
#[derive(Debug, Clone, PartialEq)]
struct PlannedVariant {
    id: i64,
    title: String,
    sku: String,
    price: Decimal,
    compare_at_price: Decimal,
    weight: Decimal,
    weight_unit: String,
    requires_shipping: bool,
    inventory_quantity: i64,
    spec: String,
    options: String,
    sort: i32,
    is_checked: bool,
    is_show: bool,
}

impl PlannedVariant {
    fn from_input(
        id: i64,
        input: &VariantInput,
        spec: &VariantSpec,
        sort: i32,
        weight_unit: &str,
    ) -> Self {
        Self {
            id,
            title: input.title.clone().unwrap_or_default(),
            sku: input.sku.clone().unwrap_or_default(),
            price: input.price.unwrap_or_default(),
            compare_at_price: input.compare_at_price.unwrap_or_default(),
            weight: input.weight.unwrap_or_default(),
            weight_unit: non_empty(input.weight_unit.as_deref())
                .unwrap_or(weight_unit)
                .to_owned(),
            requires_shipping: input.requires_shipping.unwrap_or(true),
            inventory_quantity: input.inventory_quantity.unwrap_or(0),
            spec: spec_to_string(spec),
            options: input.options.clone().unwrap_or_default(),
            sort,
            is_checked: input.is_checked.unwrap_or(true),
            is_show: true,
        }
    }

    fn row(&self, shop_id: i64, product_id: i64) -> NewVariantRow<'_> {
        NewVariantRow {
            id: self.id,
            shop_id,
            product_id,
            title: &self.title,
            sku_code: &self.sku,
            price: self.price,
            compare_at_price: self.compare_at_price,
            weight: self.weight,
            weight_unit: &self.weight_unit,
            requires_shipping: self.requires_shipping,
            inventory_quantity: self.inventory_quantity,
            spec: &self.spec,
            options: &self.options,
            sort: self.sort,
            is_checked: self.is_checked,
            is_show: self.is_show,
        }
    }
}
