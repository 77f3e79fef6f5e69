//! Variant option-axis specs.
//!
//! A spec is a flat JSON object mapping option name to option value, e.g.
//! `{"color":"red","size":"M"}`. Specs are compared as key-ordered maps, so
//! `{"a":"1","b":"2"}` and `{"b":"2","a":"1"}` are the same spec.

use std::collections::{BTreeMap, BTreeSet};

use crate::CoreError;

/// Upper bound on variants per product.
pub const MAX_VARIANTS: usize = 125;

pub type VariantSpec = BTreeMap<String, String>;

/// Parse spec text. Absent or blank text is the empty (catch-all) spec.
///
/// # Errors
///
/// Returns [`CoreError::SpecInvalid`] if the text is not a JSON object of
/// string values.
pub fn parse_spec(raw: Option<&str>) -> Result<VariantSpec, CoreError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(VariantSpec::new()),
        Some(text) => serde_json::from_str::<VariantSpec>(text).map_err(|_| CoreError::SpecInvalid),
    }
}

/// Check that every spec uses the same key set and no two specs are equal.
///
/// # Errors
///
/// Returns [`CoreError::SpecKeysMismatch`] when key sets differ, or
/// [`CoreError::SpecRepeated`] when two specs are deep-equal.
pub fn validate_specs<'a, I>(specs: I) -> Result<(), CoreError>
where
    I: IntoIterator<Item = &'a VariantSpec>,
{
    let mut seen: BTreeSet<&VariantSpec> = BTreeSet::new();
    let mut first: Option<&VariantSpec> = None;

    for spec in specs {
        match first {
            None => first = Some(spec),
            Some(reference) => {
                if !reference.keys().eq(spec.keys()) {
                    return Err(CoreError::SpecKeysMismatch);
                }
            }
        }
        if !seen.insert(spec) {
            return Err(CoreError::SpecRepeated);
        }
    }
    Ok(())
}

/// Render a spec back to compact JSON for storage.
#[must_use]
pub fn spec_to_string(spec: &VariantSpec) -> String {
    serde_json::to_string(spec).unwrap_or_else(|_| "{}".to_string())
}
