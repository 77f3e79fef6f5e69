use catalog_core::{CoreError, ProductStatus};

use super::AggregateWriter;
use crate::error::PipelineError;
use crate::events::SyncKind;

impl AggregateWriter {
    /// Soft-delete an unpublished product with its variants and tag links.
    ///
    /// Each detached tag is reported on the tag-cleanup queue after commit.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Validation`] if `shop_id` is unset or the product
    ///   is published.
    /// - [`PipelineError::NotFound`] if the product does not exist.
    /// - [`PipelineError::Store`] if the transaction fails.
    pub async fn delete_product(&self, shop_id: i64, product_id: i64) -> Result<(), PipelineError> {
        if shop_id == 0 {
            return Err(CoreError::MissingShopId.into());
        }
        let current = catalog_db::find_product(&self.pool, shop_id, product_id)
            .await?
            .ok_or(PipelineError::not_found("product"))?;
        if ProductStatus::from_code(current.status) == ProductStatus::Published {
            return Err(CoreError::DeletePublished.into());
        }

        let mut tx = self.pool.begin().await?;
        if catalog_db::soft_delete_product(&mut *tx, shop_id, product_id).await? == 0 {
            return Err(PipelineError::not_found("product"));
        }
        let variants = catalog_db::soft_delete_variants_except(&mut *tx, product_id, &[]).await?;
        let detached = catalog_db::detach_all_tags(&mut *tx, shop_id, product_id).await?;
        tx.commit().await?;

        tracing::info!(
            shop_id,
            product_id,
            variants,
            tags = detached.len(),
            "product deleted"
        );
        self.emit_tag_cleanup(shop_id, detached).await;
        self.emit_sync(shop_id, product_id, SyncKind::Delete).await;
        Ok(())
    }
}
