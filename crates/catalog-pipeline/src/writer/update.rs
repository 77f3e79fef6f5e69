use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use catalog_core::{
    join_image_ids, parse_spec, spec_to_string, strip_tags, validate_patch, validate_specs,
    ImageRef, PendingMedia, ProductPatch, ProductStatus, VariantImage, VariantInput,
    VariantSpec,
};
use catalog_db::{ProductUpdate, VariantRow, VariantUpdate};

use super::{
    attach_tags, content_hash, non_empty, position, AggregateWriter, PlannedVariant,
    DEFAULT_WEIGHT_UNIT, ID_COUNTER,
};
use crate::error::PipelineError;
use crate::events::SyncKind;
use crate::handler::generate_unique;
use crate::lock::{title_lock_key, MutationGuard};

/// Variant changes computed before the transaction opens.
#[derive(Debug, Default)]
struct VariantDiff {
    updates: Vec<(i64, VariantUpdate)>,
    inserts: Vec<PlannedVariant>,
    keep: Vec<i64>,
    images: Vec<VariantImage>,
}

impl AggregateWriter {
    /// Apply a sparse patch to an existing product aggregate.
    ///
    /// Only present fields are written. A non-empty `variants` list is the
    /// complete new set: listed ids are updated in place, entries without
    /// an id are inserted, and every other live variant is soft-deleted. An
    /// empty list leaves the variants as they are.
    /// A supplied `images` list replaces `image_ids` with its still-live
    /// ids; its new URLs are returned for reconciliation.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] for rejected input (nothing written).
    /// - [`PipelineError::NotFound`] if the product or a referenced variant
    ///   does not exist.
    /// - [`PipelineError::Contention`] if the new title is locked.
    /// - [`PipelineError::Store`] if the transaction fails; nothing is kept.
    pub async fn update_product(
        &self,
        shop_id: i64,
        product_id: i64,
        patch: ProductPatch,
    ) -> Result<PendingMedia, PipelineError> {
        validate_patch(shop_id, &patch)?;
        let status = patch
            .status
            .as_deref()
            .map(ProductStatus::parse)
            .transpose()?;

        let current = catalog_db::find_product(&self.pool, shop_id, product_id)
            .await?
            .ok_or(PipelineError::not_found("product"))?;

        // Checked before the lock so an unknown variant id changes nothing.
        let variant_inputs = patch.variants.as_deref().filter(|inputs| !inputs.is_empty());
        let variant_specs = match variant_inputs {
            Some(inputs) => Some(self.check_variant_inputs(product_id, inputs).await?),
            None => None,
        };

        let new_title = patch
            .title
            .as_deref()
            .map(|t| strip_tags(t).trim().to_owned())
            .filter(|t| *t != current.title);

        let guard = match &new_title {
            Some(title) => Some(
                MutationGuard::acquire(
                    Arc::clone(&self.locks),
                    title_lock_key(shop_id, title),
                    self.lock_ttl,
                )
                .await?,
            ),
            None => None,
        };
        let handler = match &new_title {
            Some(title) => Some(generate_unique(&self.pool, shop_id, title).await),
            None => None,
        };

        let detail = match &patch.body_html {
            Some(body) => {
                let hash = content_hash(body);
                let stored = catalog_db::find_content_hash(&self.pool, product_id).await?;
                if stored.as_deref() == Some(hash.as_str()) {
                    tracing::debug!(shop_id, product_id, "detail body unchanged");
                    None
                } else {
                    Some((body.as_str(), hash))
                }
            }
            None => None,
        };

        let retained_images = match &patch.images {
            Some(refs) => Some(self.retained_image_ids(shop_id, refs).await?),
            None => None,
        };

        let weight_unit = non_empty(patch.weight_unit.as_deref()).unwrap_or(&current.weight_unit);
        let weight_unit = if weight_unit.is_empty() {
            DEFAULT_WEIGHT_UNIT
        } else {
            weight_unit
        };
        let diff = match (variant_inputs, &variant_specs) {
            (Some(inputs), Some(specs)) => {
                Some(self.plan_variant_diff(inputs, specs, weight_unit).await?)
            }
            _ => None,
        };
        let mirror = if variant_inputs.is_none() && patch.touches_default_variant() {
            self.catch_all_mirror(product_id, &patch).await?
        } else {
            None
        };

        let update = ProductUpdate {
            title: new_title.clone(),
            handler: handler.as_ref().map(|h| h.handler.clone()),
            handler_origin: handler.as_ref().map(|h| h.origin.clone()),
            sub_title: patch.sub_title.clone(),
            price: patch.price,
            compare_at_price: patch.compare_at_price,
            weight: patch.weight,
            weight_unit: patch.weight_unit.clone(),
            default_sku_code: patch.sku.clone(),
            seo_title: patch.seo_title.clone(),
            seo_desc: patch.seo_desc.clone(),
            requires_shipping: patch.requires_shipping,
            is_use_stock: patch.is_use_stock,
            soldout_policy: patch.soldout_policy.clone(),
            product_stock: patch.inventory_quantity,
            attribute: patch.attribute.clone(),
            youtube_video_url: patch.youtube_video_url.clone(),
            youtube_video_pos: patch.youtube_video_pos.clone(),
            status: status.map(ProductStatus::code),
            image_ids: retained_images.as_deref().map(join_image_ids),
            default_image_id: retained_images
                .as_ref()
                .map(|ids| ids.first().copied().unwrap_or(0)),
        };

        let mut tx = self.pool.begin().await?;
        if catalog_db::update_product(&mut *tx, shop_id, product_id, &update).await? == 0 {
            return Err(PipelineError::not_found("product"));
        }
        if let Some(diff) = &diff {
            let removed =
                catalog_db::soft_delete_variants_except(&mut *tx, product_id, &diff.keep).await?;
            for (variant_id, variant_update) in &diff.updates {
                if !variant_update.is_empty() {
                    catalog_db::update_variant(&mut *tx, product_id, *variant_id, variant_update)
                        .await?;
                }
            }
            for variant in &diff.inserts {
                catalog_db::insert_variant(&mut *tx, &variant.row(shop_id, product_id)).await?;
            }
            tracing::debug!(
                product_id,
                updated = diff.updates.len(),
                inserted = diff.inserts.len(),
                removed,
                "variant set replaced"
            );
        }
        if let Some((variant_id, variant_update)) = &mirror {
            catalog_db::update_variant(&mut *tx, product_id, *variant_id, variant_update).await?;
        }
        let orphaned_tags: Vec<i64> = match &patch.tags {
            Some(tags) => {
                let detached = catalog_db::detach_all_tags(&mut *tx, shop_id, product_id).await?;
                let attached: HashSet<i64> = attach_tags(&mut *tx, shop_id, product_id, tags)
                    .await?
                    .into_iter()
                    .collect();
                detached
                    .into_iter()
                    .filter(|id| !attached.contains(id))
                    .collect()
            }
            None => Vec::new(),
        };
        if let Some((body, hash)) = &detail {
            catalog_db::upsert_detail(&mut *tx, product_id, body, hash).await?;
        }
        tx.commit().await?;
        if let Some(guard) = guard {
            guard.release().await;
        }

        tracing::info!(shop_id, product_id, "product updated");
        self.emit_tag_cleanup(shop_id, orphaned_tags).await;
        self.emit_sync(shop_id, product_id, SyncKind::Update).await;

        let mut pending = PendingMedia::new(shop_id, product_id);
        pending.default_image_url = patch.default_image_url;
        pending.image_urls = patch
            .images
            .iter()
            .flatten()
            .filter(|r| r.id.is_none())
            .filter_map(|r| r.url.clone())
            .collect();
        pending.variant_images = diff.map(|d| d.images).unwrap_or_default();
        Ok(pending)
    }

    /// Ids referenced by `refs`, in order, keeping only live images of the
    /// shop.
    async fn retained_image_ids(
        &self,
        shop_id: i64,
        refs: &[ImageRef],
    ) -> Result<Vec<i64>, PipelineError> {
        let mut seen = HashSet::new();
        let requested: Vec<i64> = refs
            .iter()
            .filter_map(|r| r.id)
            .filter(|id| *id > 0 && seen.insert(*id))
            .collect();
        let live: HashSet<i64> = catalog_db::live_image_ids(&self.pool, shop_id, &requested)
            .await?
            .into_iter()
            .collect();
        Ok(requested.into_iter().filter(|id| live.contains(id)).collect())
    }

    /// Resulting specs of `inputs`, validated as a set. Every referenced id
    /// must be a live variant of the product.
    async fn check_variant_inputs(
        &self,
        product_id: i64,
        inputs: &[VariantInput],
    ) -> Result<Vec<VariantSpec>, PipelineError> {
        let existing = catalog_db::list_variants(&self.pool, product_id).await?;
        let by_id: HashMap<i64, &VariantRow> = existing.iter().map(|v| (v.id, v)).collect();

        if inputs
            .iter()
            .filter_map(|input| input.id)
            .any(|id| !by_id.contains_key(&id))
        {
            return Err(PipelineError::not_found("variant"));
        }

        let mut specs = Vec::with_capacity(inputs.len());
        for input in inputs {
            specs.push(effective_spec(input, &by_id)?);
        }
        validate_specs(&specs)?;
        Ok(specs)
    }

    async fn plan_variant_diff(
        &self,
        inputs: &[VariantInput],
        specs: &[VariantSpec],
        weight_unit: &str,
    ) -> Result<VariantDiff, PipelineError> {
        let mut diff = VariantDiff::default();
        for (index, (input, spec)) in inputs.iter().zip(specs).enumerate() {
            let sort = position(index);
            let variant_id = match input.id {
                Some(id) => {
                    diff.updates.push((id, variant_update(input, spec, sort)));
                    diff.keep.push(id);
                    id
                }
                None => {
                    let id = self.ids.next_id(ID_COUNTER).await?;
                    diff.inserts
                        .push(PlannedVariant::from_input(id, input, spec, sort, weight_unit));
                    id
                }
            };
            if let Some(url) = &input.image_url {
                diff.images.push(VariantImage {
                    variant_id,
                    url: url.clone(),
                });
            }
        }
        Ok(diff)
    }

    /// When the only live variant is the hidden catch-all, the top-level
    /// commerce fields of `patch` are mirrored into it.
    async fn catch_all_mirror(
        &self,
        product_id: i64,
        patch: &ProductPatch,
    ) -> Result<Option<(i64, VariantUpdate)>, PipelineError> {
        let existing = catalog_db::list_variants(&self.pool, product_id).await?;
        let [only] = existing.as_slice() else {
            return Ok(None);
        };
        if only.is_show {
            return Ok(None);
        }
        Ok(Some((
            only.id,
            VariantUpdate {
                sku_code: patch.sku.clone(),
                price: patch.price,
                compare_at_price: patch.compare_at_price,
                weight: patch.weight,
                weight_unit: patch.weight_unit.clone(),
                requires_shipping: patch.requires_shipping,
                inventory_quantity: patch.inventory_quantity,
                ..VariantUpdate::default()
            },
        )))
    }
}

/// The spec a variant will have after the update: the supplied one, else
/// the stored one for an existing variant, else the catch-all.
fn effective_spec(
    input: &VariantInput,
    existing: &HashMap<i64, &VariantRow>,
) -> Result<VariantSpec, PipelineError> {
    if input.spec.is_some() {
        return Ok(parse_spec(input.spec.as_deref())?);
    }
    match input.id.and_then(|id| existing.get(&id)) {
        Some(row) => Ok(parse_spec(Some(row.spec.as_str()))?),
        None => Ok(VariantSpec::new()),
    }
}

fn variant_update(input: &VariantInput, spec: &VariantSpec, sort: i32) -> VariantUpdate {
    VariantUpdate {
        title: input.title.clone(),
        sku_code: input.sku.clone(),
        price: input.price,
        compare_at_price: input.compare_at_price,
        weight: input.weight,
        weight_unit: input.weight_unit.clone(),
        requires_shipping: input.requires_shipping,
        inventory_quantity: input.inventory_quantity,
        spec: input.spec.as_ref().map(|_| spec_to_string(spec)),
        options: input.options.clone(),
        sort: Some(sort),
        is_checked: input.is_checked,
    }
}
