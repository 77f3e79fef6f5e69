//! Media references collected by a write for asynchronous reconciliation.

use serde::{Deserialize, Serialize};

/// Extensions accepted for remote product and variant images.
pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 6] = [".png", ".jpg", ".jpeg", ".bmp", ".svg", ".gif"];

/// Return the accepted extension of `url` (lowercased, with the leading dot),
/// or `None` if the last path segment does not end in one.
///
/// Query strings and fragments are ignored.
#[must_use]
pub fn image_extension(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').next()?;
    let dot = file_name.rfind('.')?;
    let ext = file_name[dot..].to_ascii_lowercase();
    ALLOWED_IMAGE_EXTENSIONS
        .iter()
        .copied()
        .find(|allowed| *allowed == ext)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantImage {
    pub variant_id: i64,
    pub url: String,
}

/// Image URLs a committed write left for the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMedia {
    pub shop_id: i64,
    pub product_id: i64,
    pub default_image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub variant_images: Vec<VariantImage>,
}

impl PendingMedia {
    #[must_use]
    pub fn new(shop_id: i64, product_id: i64) -> Self {
        Self {
            shop_id,
            product_id,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.default_image_url.is_none()
            && self.image_urls.is_empty()
            && self.variant_images.is_empty()
    }

    /// Every URL to fetch: product images, then variant images, then the
    /// designated default if it appeared in neither. First occurrence wins.
    #[must_use]
    pub fn distinct_urls(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.image_urls
            .iter()
            .chain(self.variant_images.iter().map(|v| &v.url))
            .chain(self.default_image_url.iter())
            .filter(|url| seen.insert(url.as_str()))
            .cloned()
            .collect()
    }
}
