//! Denormalized product reads.
//!
//! A view is the base product row plus up to four independent sub-fetches
//! (detail body, default image, variants, image list) run concurrently and
//! joined before returning. A missing image or detail row only drops that
//! part of the view; any other store error fails the whole read.

use std::cmp::Reverse;
use std::collections::HashMap;

use catalog_core::{
    parse_image_ids, parse_spec, FieldMask, ImageView, Pagination, ProductListFilter,
    ProductStatus, ProductView, VariantView,
};
use catalog_db::{DbError, ImageRow, ProductRow, VariantRow};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use sqlx::PgPool;

use crate::error::PipelineError;

/// Upper bound on concurrent image lookups for one product.
const IMAGE_FETCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductLookup {
    Id(i64),
    Handler(String),
}

/// One page of assembled products plus the total for the filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPage {
    pub products: Vec<ProductView>,
    pub count: i64,
}

#[derive(Clone)]
pub struct ReadAggregator {
    pool: PgPool,
}

impl ReadAggregator {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load one product view.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::NotFound`] if no live product matches the
    /// lookup, or [`PipelineError::Store`] if any query fails.
    pub async fn get_product(
        &self,
        shop_id: i64,
        lookup: &ProductLookup,
        mask: &FieldMask,
    ) -> Result<ProductView, PipelineError> {
        let row = match lookup {
            ProductLookup::Id(id) => catalog_db::find_product(&self.pool, shop_id, *id).await?,
            ProductLookup::Handler(handler) => {
                catalog_db::find_product_by_handler(&self.pool, shop_id, handler).await?
            }
        }
        .ok_or(PipelineError::not_found("product"))?;
        self.assemble(row, mask).await
    }

    /// Load one page of products matching `filter`, newest id first.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Store`] if the listing or any assembly fails.
    pub async fn list_products(
        &self,
        shop_id: i64,
        filter: &ProductListFilter,
        page: Pagination,
        mask: &FieldMask,
    ) -> Result<ProductPage, PipelineError> {
        let (rows, count) = tokio::try_join!(
            catalog_db::list_products(&self.pool, shop_id, filter, page),
            catalog_db::count_products(&self.pool, shop_id, filter),
        )?;

        let concurrency = rows.len().max(1);
        let mut products: Vec<ProductView> = stream::iter(rows)
            .map(|row| self.assemble(row, mask))
            .buffer_unordered(concurrency)
            .try_collect()
            .await?;
        products.sort_by_key(|p| Reverse(p.id));

        Ok(ProductPage { products, count })
    }

    async fn assemble(&self, row: ProductRow, mask: &FieldMask) -> Result<ProductView, PipelineError> {
        let image_ids = parse_image_ids(&row.image_ids);
        let (body_html, default_image, variants, images) = tokio::try_join!(
            self.fetch_body(&row, mask.wants_body()),
            self.fetch_default_image(&row, mask.wants_default_image()),
            self.fetch_variants(&row, mask.wants_variants()),
            self.fetch_images(row.shop_id, &image_ids, mask.wants_images()),
        )?;

        Ok(ProductView {
            id: row.id,
            shop_id: row.shop_id,
            preview_url: preview_url(&row.handler),
            title: row.title,
            sub_title: row.sub_title,
            handler: row.handler,
            price: row.price,
            compare_at_price: row.compare_at_price,
            weight: row.weight,
            weight_unit: row.weight_unit,
            sku: row.default_sku_code,
            seo_title: row.seo_title,
            seo_desc: row.seo_desc,
            requires_shipping: row.requires_shipping,
            is_use_stock: row.is_use_stock,
            soldout_policy: row.soldout_policy,
            inventory_quantity: row.product_stock,
            status: ProductStatus::from_code(row.status),
            published_at: row.published_at,
            youtube_video_url: row.youtube_video_url,
            youtube_video_pos: row.youtube_video_pos,
            attribute: row.attribute,
            source: row.source,
            image_ids,
            default_image_id: row.default_image_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            body_html,
            default_image,
            images,
            variants,
        })
    }

    async fn fetch_body(&self, row: &ProductRow, wanted: bool) -> Result<Option<String>, PipelineError> {
        if !wanted {
            return Ok(None);
        }
        match catalog_db::find_detail(&self.pool, row.id).await {
            Ok(detail) => Ok(Some(detail.body_html)),
            Err(e) if e.is_not_found() => {
                tracing::warn!(product_id = row.id, "product detail missing");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_default_image(
        &self,
        row: &ProductRow,
        wanted: bool,
    ) -> Result<Option<ImageView>, PipelineError> {
        if !wanted || row.default_image_id == 0 {
            return Ok(None);
        }
        Ok(find_image_view(&self.pool, row.shop_id, row.default_image_id).await?)
    }

    async fn fetch_variants(
        &self,
        row: &ProductRow,
        wanted: bool,
    ) -> Result<Option<Vec<VariantView>>, PipelineError> {
        if !wanted {
            return Ok(None);
        }
        let variants = catalog_db::list_variants(&self.pool, row.id).await?;
        let mut image_ids: Vec<i64> = variants
            .iter()
            .map(|v| v.image_id)
            .filter(|id| *id > 0)
            .collect();
        image_ids.sort_unstable();
        image_ids.dedup();

        let sources: HashMap<i64, String> = catalog_db::list_images_by_ids(&self.pool, row.shop_id, &image_ids)
            .await?
            .into_iter()
            .map(|image| (image.id, image.src))
            .collect();

        let inventory_policy = if row.is_use_stock { "Y" } else { "N" };
        Ok(Some(
            variants
                .into_iter()
                .map(|v| variant_view(v, &sources, inventory_policy))
                .collect(),
        ))
    }

    /// Images in `image_ids` order. Lookups complete in any order and are
    /// written back into their original slot.
    async fn fetch_images(
        &self,
        shop_id: i64,
        image_ids: &[i64],
        wanted: bool,
    ) -> Result<Option<Vec<ImageView>>, PipelineError> {
        if !wanted {
            return Ok(None);
        }
        let mut slots: Vec<Option<ImageView>> = vec![None; image_ids.len()];
        let mut fetches = stream::iter(image_ids.iter().copied().enumerate())
            .map(|(index, image_id)| async move {
                find_image_view(&self.pool, shop_id, image_id)
                    .await
                    .map(|view| (index, view))
            })
            .buffer_unordered(IMAGE_FETCH_CONCURRENCY);

        while let Some((index, view)) = fetches.try_next().await? {
            slots[index] = view;
        }
        Ok(Some(slots.into_iter().flatten().collect()))
    }
}

/// `Ok(None)` for an image that no longer exists.
async fn find_image_view(pool: &PgPool, shop_id: i64, image_id: i64) -> Result<Option<ImageView>, DbError> {
    match catalog_db::find_image(pool, shop_id, image_id).await {
        Ok(image) => Ok(Some(image_view(image))),
        Err(e) if e.is_not_found() => {
            tracing::warn!(shop_id, image_id, "image missing, omitted from view");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn image_view(image: ImageRow) -> ImageView {
    ImageView {
        id: image.id,
        src: image.src,
        width: image.width,
    }
}

fn variant_view(row: VariantRow, sources: &HashMap<i64, String>, inventory_policy: &str) -> VariantView {
    VariantView {
        image: sources.get(&row.image_id).cloned(),
        spec: parse_spec(Some(row.spec.as_str())).unwrap_or_default(),
        id: row.id,
        product_id: row.product_id,
        title: row.title,
        sku: row.sku_code,
        price: row.price,
        compare_at_price: row.compare_at_price,
        weight: row.weight,
        weight_unit: row.weight_unit,
        requires_shipping: row.requires_shipping,
        inventory_quantity: row.inventory_quantity,
        inventory_policy: inventory_policy.to_owned(),
        options: row.options,
        sort: row.sort,
        is_show: row.is_show,
        image_id: row.image_id,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}

fn preview_url(handler: &str) -> String {
    format!("/products/{handler}")
}
