use std::sync::Arc;

use catalog_core::{
    default_seo_desc, strip_tags, validate_new_product, validate_variants, NewProduct,
    PendingMedia, ProductStatus, VariantImage, VariantSpec,
};
use catalog_db::NewProductRow;

use super::{
    attach_tags, content_hash, non_empty, position, AggregateWriter, CreatedProduct,
    PlannedVariant, DEFAULT_WEIGHT_UNIT, ID_COUNTER,
};
use crate::error::PipelineError;
use crate::events::SyncKind;
use crate::handler::generate_unique;
use crate::lock::{title_lock_key, MutationGuard};

impl AggregateWriter {
    /// Create a product aggregate.
    ///
    /// With no variants supplied, a hidden catch-all variant is synthesized
    /// from the top-level price and SKU.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] for rejected input (nothing written).
    /// - [`PipelineError::Contention`] if the title is locked by another write.
    /// - [`PipelineError::Store`] / [`PipelineError::Capability`] if id
    ///   allocation or the transaction fails; the aggregate is rolled back.
    pub async fn create_product(&self, input: NewProduct) -> Result<CreatedProduct, PipelineError> {
        validate_new_product(&input)?;
        let specs = validate_variants(&input.variants)?;
        let status = input
            .status
            .as_deref()
            .map(ProductStatus::parse)
            .transpose()?
            .unwrap_or(ProductStatus::Unpublished);

        let shop_id = input.shop_id;
        let title = strip_tags(&input.title).trim().to_owned();

        let guard = MutationGuard::acquire(
            Arc::clone(&self.locks),
            title_lock_key(shop_id, &title),
            self.lock_ttl,
        )
        .await?;

        let product_id = self.ids.next_id(ID_COUNTER).await?;
        let weight_unit = non_empty(input.weight_unit.as_deref()).unwrap_or(DEFAULT_WEIGHT_UNIT);
        let variants = self
            .plan_new_variants(&input, &title, &specs, weight_unit)
            .await?;
        let handler = generate_unique(&self.pool, shop_id, &title).await;

        let body = input.body_html.clone().unwrap_or_default();
        let seo_title = non_empty(input.seo_title.as_deref()).unwrap_or(&title);
        let seo_desc = non_empty(input.seo_desc.as_deref())
            .map_or_else(|| default_seo_desc(&body), ToOwned::to_owned);

        let row = NewProductRow {
            id: product_id,
            shop_id,
            title: &title,
            sub_title: input.sub_title.as_deref().unwrap_or_default(),
            price: input.price,
            compare_at_price: input.compare_at_price,
            weight: input.weight,
            weight_unit,
            default_sku_code: input.sku.as_deref().unwrap_or_default(),
            seo_title,
            seo_desc: &seo_desc,
            requires_shipping: input.requires_shipping.unwrap_or(true),
            is_use_stock: input.is_use_stock,
            soldout_policy: non_empty(input.soldout_policy.as_deref()),
            product_stock: input.inventory_quantity,
            handler: &handler.handler,
            handler_origin: &handler.origin,
            attribute: input.attribute.as_deref(),
            youtube_video_url: input.youtube_video_url.as_deref().unwrap_or_default(),
            youtube_video_pos: input.youtube_video_pos.as_deref().unwrap_or_default(),
            source: input.source.as_deref().unwrap_or_default(),
            status: status.code(),
        };

        let mut tx = self.pool.begin().await?;
        catalog_db::insert_product(&mut *tx, &row).await?;
        for variant in &variants {
            catalog_db::insert_variant(&mut *tx, &variant.row(shop_id, product_id)).await?;
        }
        attach_tags(&mut *tx, shop_id, product_id, &input.tags).await?;
        catalog_db::upsert_detail(&mut *tx, product_id, &body, &content_hash(&body)).await?;
        tx.commit().await?;
        guard.release().await;

        tracing::info!(
            shop_id,
            product_id,
            handler = %handler.handler,
            variants = variants.len(),
            "product created"
        );
        self.emit_sync(shop_id, product_id, SyncKind::Add).await;

        let pending = pending_for_create(&input, product_id, &variants);
        Ok(CreatedProduct {
            product_id,
            handler: handler.handler,
            pending,
        })
    }

    async fn plan_new_variants(
        &self,
        input: &NewProduct,
        title: &str,
        specs: &[VariantSpec],
        weight_unit: &str,
    ) -> Result<Vec<PlannedVariant>, PipelineError> {
        if input.variants.is_empty() {
            let id = self.ids.next_id(ID_COUNTER).await?;
            return Ok(vec![catch_all_variant(id, input, title, weight_unit)]);
        }

        let mut planned = Vec::with_capacity(input.variants.len());
        for (index, (variant, spec)) in input.variants.iter().zip(specs).enumerate() {
            let id = self.ids.next_id(ID_COUNTER).await?;
            planned.push(PlannedVariant::from_input(
                id,
                variant,
                spec,
                position(index),
                weight_unit,
            ));
        }
        Ok(planned)
    }
}

fn catch_all_variant(id: i64, input: &NewProduct, title: &str, weight_unit: &str) -> PlannedVariant {
    PlannedVariant {
        id,
        title: title.to_owned(),
        sku: input.sku.clone().unwrap_or_default(),
        price: input.price,
        compare_at_price: input.compare_at_price,
        weight: input.weight,
        weight_unit: weight_unit.to_owned(),
        requires_shipping: input.requires_shipping.unwrap_or(true),
        inventory_quantity: input.inventory_quantity,
        spec: "{}".to_owned(),
        options: String::new(),
        sort: 1,
        is_checked: true,
        is_show: false,
    }
}

/// Media left for the reconciler. The default image is the explicit one,
/// else the first product image, else the first variant image.
fn pending_for_create(input: &NewProduct, product_id: i64, variants: &[PlannedVariant]) -> PendingMedia {
    let variant_images: Vec<VariantImage> = input
        .variants
        .iter()
        .zip(variants)
        .filter_map(|(requested, planned)| {
            requested.image_url.as_ref().map(|url| VariantImage {
                variant_id: planned.id,
                url: url.clone(),
            })
        })
        .collect();

    let default_image_url = input
        .default_image_url
        .clone()
        .or_else(|| input.images.first().cloned())
        .or_else(|| variant_images.first().map(|v| v.url.clone()));

    PendingMedia {
        shop_id: input.shop_id,
        product_id,
        default_image_url,
        image_urls: input.images.clone(),
        variant_images,
    }
}
