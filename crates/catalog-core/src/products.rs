use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::variant_spec::VariantSpec;
use crate::CoreError;

/// Publication state. Stored as `1` (published) or `2` (unpublished).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Published,
    Unpublished,
}

impl ProductStatus {
    #[must_use]
    pub const fn code(self) -> i16 {
        match self {
            ProductStatus::Published => 1,
            ProductStatus::Unpublished => 2,
        }
    }

    /// Any code other than `1` reads as unpublished.
    #[must_use]
    pub const fn from_code(code: i16) -> Self {
        if code == 1 {
            ProductStatus::Published
        } else {
            ProductStatus::Unpublished
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ProductStatus::Published => "published",
            ProductStatus::Unpublished => "unpublished",
        }
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidStatus`] for anything other than
    /// `"published"` or `"unpublished"`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw {
            "published" => Ok(ProductStatus::Published),
            "unpublished" => Ok(ProductStatus::Unpublished),
            other => Err(CoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// A reference to a product image in an update: either an already-persisted
/// image (`id`) or a new remote URL to reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub url: Option<String>,
}

/// One variant in a create or update request.
///
/// Every field is optional so the same shape serves inserts and in-place
/// updates. `None` means "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantInput {
    /// Present for an existing variant that should be updated in place.
    pub id: Option<i64>,
    pub title: Option<String>,
    pub sku: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub weight_unit: Option<String>,
    pub requires_shipping: Option<bool>,
    pub inventory_quantity: Option<i64>,
    /// JSON object text, e.g. `{"color":"red","size":"M"}`.
    pub spec: Option<String>,
    pub options: Option<String>,
    pub is_checked: Option<bool>,
    pub image_url: Option<String>,
}

/// Input for creating a product aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewProduct {
    pub shop_id: i64,
    pub title: String,
    pub sub_title: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Decimal,
    pub weight: Decimal,
    pub weight_unit: Option<String>,
    pub sku: Option<String>,
    pub inventory_quantity: i64,
    pub requires_shipping: Option<bool>,
    pub is_use_stock: bool,
    pub soldout_policy: Option<String>,
    /// `"published"` or `"unpublished"`; absent means unpublished.
    pub status: Option<String>,
    pub body_html: Option<String>,
    pub seo_title: Option<String>,
    pub seo_desc: Option<String>,
    pub youtube_video_url: Option<String>,
    pub youtube_video_pos: Option<String>,
    pub attribute: Option<String>,
    pub source: Option<String>,
    pub tags: Vec<String>,
    pub default_image_url: Option<String>,
    pub images: Vec<String>,
    pub variants: Vec<VariantInput>,
}

/// Sparse update for an existing product.
///
/// `None` keeps the stored value; `Some(v)` writes `v`, including zero
/// prices and empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductPatch {
    pub title: Option<String>,
    pub sub_title: Option<String>,
    pub price: Option<Decimal>,
    pub compare_at_price: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub weight_unit: Option<String>,
    pub sku: Option<String>,
    pub inventory_quantity: Option<i64>,
    pub requires_shipping: Option<bool>,
    pub is_use_stock: Option<bool>,
    pub soldout_policy: Option<String>,
    pub status: Option<String>,
    pub body_html: Option<String>,
    pub seo_title: Option<String>,
    pub seo_desc: Option<String>,
    pub youtube_video_url: Option<String>,
    pub youtube_video_pos: Option<String>,
    pub attribute: Option<String>,
    pub tags: Option<Vec<String>>,
    pub default_image_url: Option<String>,
    pub images: Option<Vec<ImageRef>>,
    pub variants: Option<Vec<VariantInput>>,
}

impl ProductPatch {
    /// Whether any of the fields mirrored into a hidden catch-all variant
    /// are present.
    #[must_use]
    pub fn touches_default_variant(&self) -> bool {
        self.price.is_some()
            || self.compare_at_price.is_some()
            || self.weight.is_some()
            || self.weight_unit.is_some()
            || self.sku.is_some()
            || self.inventory_quantity.is_some()
            || self.requires_shipping.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageView {
    pub id: i64,
    pub src: String,
    pub width: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantView {
    pub id: i64,
    pub product_id: i64,
    pub title: String,
    pub sku: String,
    pub price: Decimal,
    pub compare_at_price: Decimal,
    pub weight: Decimal,
    pub weight_unit: String,
    pub requires_shipping: bool,
    pub inventory_quantity: i64,
    /// `"Y"` when the parent product tracks stock, `"N"` otherwise.
    pub inventory_policy: String,
    pub spec: VariantSpec,
    pub options: String,
    pub sort: i32,
    pub is_show: bool,
    pub image_id: i64,
    /// Resolved image URL; `None` when unbound or the image is gone.
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The denormalized read model for one product.
///
/// The four sub-fetched parts are `None` when masked out or, for
/// `default_image`, when nothing is bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductView {
    pub id: i64,
    pub shop_id: i64,
    pub title: String,
    pub sub_title: String,
    pub handler: String,
    pub preview_url: String,
    pub price: Decimal,
    pub compare_at_price: Decimal,
    pub weight: Decimal,
    pub weight_unit: String,
    pub sku: String,
    pub seo_title: String,
    pub seo_desc: String,
    pub requires_shipping: bool,
    pub is_use_stock: bool,
    pub soldout_policy: Option<String>,
    pub inventory_quantity: i64,
    pub status: ProductStatus,
    pub published_at: Option<DateTime<Utc>>,
    pub youtube_video_url: String,
    pub youtube_video_pos: String,
    pub attribute: Option<String>,
    pub source: String,
    pub image_ids: Vec<i64>,
    pub default_image_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_image: Option<ImageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageView>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variants: Option<Vec<VariantView>>,
}

/// Parse the comma-joined `image_ids` column. Blank and non-numeric
/// segments are skipped.
#[must_use]
pub fn parse_image_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .collect()
}

#[must_use]
pub fn join_image_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
