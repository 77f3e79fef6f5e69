pub mod app_config;
pub mod config;
pub mod fields;
pub mod listing;
pub mod media;
pub mod products;
pub mod slug;
pub mod validate;
pub mod variant_spec;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use fields::FieldMask;
pub use listing::{Pagination, ProductListFilter, PublishedStatus};
pub use media::{image_extension, PendingMedia, VariantImage, ALLOWED_IMAGE_EXTENSIONS};
pub use products::{
    join_image_ids, parse_image_ids, ImageRef, ImageView, NewProduct, ProductPatch,
    ProductStatus, ProductView, VariantInput, VariantView,
};
pub use slug::{base36_suffix, default_seo_desc, normalize_title, strip_tags};
pub use validate::{validate_new_product, validate_patch, validate_variants};
pub use variant_spec::{parse_spec, spec_to_string, validate_specs, VariantSpec, MAX_VARIANTS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

/// Input rejections. The `Display` text is what callers see.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("shop_id not set")]
    MissingShopId,
    #[error("product.title not set")]
    MissingTitle,
    #[error("image in wrong format")]
    ImageFormat,
    #[error("max size of product variants is {MAX_VARIANTS}")]
    TooManyVariants,
    #[error("variants item need price param")]
    VariantPriceMissing,
    #[error("field spec invalid")]
    SpecInvalid,
    #[error("field spec.name invalid")]
    SpecKeysMismatch,
    #[error("field spec repeated")]
    SpecRepeated,
    #[error("status invalid: {0}")]
    InvalidStatus(String),
    #[error("only unpublished product can be deleted")]
    DeletePublished,
}
