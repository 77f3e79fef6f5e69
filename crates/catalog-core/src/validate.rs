//! Input checks that run before any lock or transaction is taken.

use rust_decimal::Decimal;

use crate::media::image_extension;
use crate::products::{NewProduct, ProductPatch, ProductStatus, VariantInput};
use crate::slug::strip_tags;
use crate::variant_spec::{parse_spec, validate_specs, VariantSpec, MAX_VARIANTS};
use crate::CoreError;

/// Validate a create request in full, including cross-variant spec checks.
///
/// # Errors
///
/// Returns the first [`CoreError`] found.
pub fn validate_new_product(input: &NewProduct) -> Result<(), CoreError> {
    if input.shop_id == 0 {
        return Err(CoreError::MissingShopId);
    }
    if strip_tags(&input.title).trim().is_empty() {
        return Err(CoreError::MissingTitle);
    }
    if let Some(status) = &input.status {
        ProductStatus::parse(status)?;
    }
    check_image_urls(
        input
            .images
            .iter()
            .map(String::as_str)
            .chain(input.default_image_url.as_deref()),
    )?;
    let specs = validate_variants(&input.variants)?;
    validate_specs(&specs)
}

/// Validate an update request.
///
/// Cross-variant spec checks need the stored specs of variants that keep
/// their spec, so they are left to the writer.
///
/// # Errors
///
/// Returns the first [`CoreError`] found.
pub fn validate_patch(shop_id: i64, patch: &ProductPatch) -> Result<(), CoreError> {
    if shop_id == 0 {
        return Err(CoreError::MissingShopId);
    }
    if let Some(title) = &patch.title {
        if strip_tags(title).trim().is_empty() {
            return Err(CoreError::MissingTitle);
        }
    }
    if let Some(status) = &patch.status {
        ProductStatus::parse(status)?;
    }
    let new_image_urls = patch
        .images
        .iter()
        .flatten()
        .filter(|r| r.id.is_none())
        .filter_map(|r| r.url.as_deref());
    check_image_urls(new_image_urls.chain(patch.default_image_url.as_deref()))?;
    if let Some(variants) = &patch.variants {
        validate_variants(variants)?;
    }
    Ok(())
}

/// Per-variant checks: count ceiling, price, image format, spec syntax.
///
/// Returns the parsed spec of each variant in input order. A variant with
/// an `id` and no `spec` yields an empty placeholder.
///
/// # Errors
///
/// Returns the first [`CoreError`] found.
pub fn validate_variants(variants: &[VariantInput]) -> Result<Vec<VariantSpec>, CoreError> {
    if variants.len() > MAX_VARIANTS {
        return Err(CoreError::TooManyVariants);
    }
    let mut specs = Vec::with_capacity(variants.len());
    for variant in variants {
        match (variant.id, variant.price) {
            (None, None) => return Err(CoreError::VariantPriceMissing),
            (_, Some(price)) if price == Decimal::ZERO => {
                return Err(CoreError::VariantPriceMissing)
            }
            _ => {}
        }
        if let Some(url) = &variant.image_url {
            check_image_urls(std::iter::once(url.as_str()))?;
        }
        specs.push(parse_spec(variant.spec.as_deref())?);
    }
    Ok(specs)
}

fn check_image_urls<'a>(urls: impl Iterator<Item = &'a str>) -> Result<(), CoreError> {
    for url in urls {
        if image_extension(url).is_none() {
            return Err(CoreError::ImageFormat);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::products::ImageRef;

    fn priced(spec: &str) -> VariantInput {
        VariantInput {
            price: Some(Decimal::new(1999, 2)),
            spec: Some(spec.to_string()),
            ..VariantInput::default()
        }
    }

    fn new_product() -> NewProduct {
        NewProduct {
            shop_id: 7,
            title: "Red Shoe".to_string(),
            ..NewProduct::default()
        }
    }

    #[test]
    fn minimal_product_is_valid() {
        assert_eq!(validate_new_product(&new_product()), Ok(()));
    }

    #[test]
    fn missing_shop_and_title_are_rejected() {
        let mut input = new_product();
        input.shop_id = 0;
        assert_eq!(validate_new_product(&input), Err(CoreError::MissingShopId));

        let mut input = new_product();
        input.title = "<b></b>".to_string();
        assert_eq!(validate_new_product(&input), Err(CoreError::MissingTitle));
    }

    #[test]
    fn wrong_image_format_is_rejected() {
        let mut input = new_product();
        input.images = vec!["https://img.test/a/b/c.webp".to_string()];
        assert_eq!(validate_new_product(&input), Err(CoreError::ImageFormat));
    }

    #[test]
    fn variant_without_price_is_rejected() {
        let mut input = new_product();
        input.variants = vec![VariantInput::default()];
        assert_eq!(
            validate_new_product(&input),
            Err(CoreError::VariantPriceMissing)
        );
    }

    #[test]
    fn variant_with_zero_price_is_rejected() {
        let mut input = new_product();
        input.variants = vec![VariantInput {
            price: Some(Decimal::ZERO),
            ..VariantInput::default()
        }];
        assert_eq!(
            validate_new_product(&input),
            Err(CoreError::VariantPriceMissing)
        );
    }

    #[test]
    fn too_many_variants_is_rejected() {
        let mut input = new_product();
        input.variants = (0..=MAX_VARIANTS)
            .map(|i| priced(&format!(r#"{{"n":"{i}"}}"#)))
            .collect();
        assert_eq!(validate_new_product(&input), Err(CoreError::TooManyVariants));
    }

    #[test]
    fn duplicate_specs_are_rejected_on_create() {
        let mut input = new_product();
        input.variants = vec![priced(r#"{"color":"red"}"#), priced(r#"{"color":"red"}"#)];
        assert_eq!(validate_new_product(&input), Err(CoreError::SpecRepeated));
    }

    #[test]
    fn mismatched_axes_are_rejected_on_create() {
        let mut input = new_product();
        input.variants = vec![priced(r#"{"color":"red"}"#), priced(r#"{"size":"M"}"#)];
        assert_eq!(validate_new_product(&input), Err(CoreError::SpecKeysMismatch));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut input = new_product();
        input.status = Some("draft".to_string());
        assert!(matches!(
            validate_new_product(&input),
            Err(CoreError::InvalidStatus(_))
        ));
    }

    #[test]
    fn patch_allows_existing_variant_without_price() {
        let patch = ProductPatch {
            variants: Some(vec![VariantInput {
                id: Some(10),
                ..VariantInput::default()
            }]),
            ..ProductPatch::default()
        };
        assert_eq!(validate_patch(1, &patch), Ok(()));
    }

    #[test]
    fn patch_checks_only_new_image_urls() {
        let patch = ProductPatch {
            images: Some(vec![
                ImageRef {
                    id: Some(4),
                    url: Some("https://img.test/legacy/no-extension".to_string()),
                },
                ImageRef {
                    id: None,
                    url: Some("https://img.test/a/b/new.tiff".to_string()),
                },
            ]),
            ..ProductPatch::default()
        };
        assert_eq!(validate_patch(1, &patch), Err(CoreError::ImageFormat));
    }

    #[test]
    fn patch_rejects_blank_title_and_zero_shop() {
        let patch = ProductPatch {
            title: Some("   ".to_string()),
            ..ProductPatch::default()
        };
        assert_eq!(validate_patch(1, &patch), Err(CoreError::MissingTitle));
        assert_eq!(
            validate_patch(0, &ProductPatch::default()),
            Err(CoreError::MissingShopId)
        );
    }
}
