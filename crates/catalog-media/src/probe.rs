//! Content fingerprint and dimension probe for fetched images.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `bytes`, the dedup key of an image.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Pixel width of a raster image, or 0 if it cannot be decoded.
///
/// SVG is never rasterized, so its width is always 0.
#[must_use]
pub fn probe_width(bytes: &[u8], extension: &str) -> i32 {
    if extension.eq_ignore_ascii_case(".svg") {
        return 0;
    }
    match image::load_from_memory(bytes) {
        Ok(img) => i32::try_from(img.width()).unwrap_or(i32::MAX),
        Err(e) => {
            tracing::debug!(error = %e, "image not decodable, width unknown");
            0
        }
    }
}

/// Object key under which an image is stored: `uploader/{fingerprint}{ext}`.
#[must_use]
pub fn object_key(fingerprint: &str, extension: &str) -> String {
    format!("uploader/{fingerprint}{extension}")
}
