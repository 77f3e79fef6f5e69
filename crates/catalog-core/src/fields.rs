use std::collections::BTreeSet;

/// Which parts of a product view a reader asked for.
///
/// Parsed from a comma-separated `fields` parameter; an empty or missing
/// parameter selects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMask {
    fields: Option<BTreeSet<String>>,
}

impl FieldMask {
    #[must_use]
    pub fn all() -> Self {
        Self { fields: None }
    }

    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let fields: BTreeSet<String> = raw
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(ToOwned::to_owned)
            .collect();
        if fields.is_empty() {
            Self::all()
        } else {
            Self {
                fields: Some(fields),
            }
        }
    }

    #[must_use]
    pub fn includes(&self, field: &str) -> bool {
        self.fields.as_ref().is_none_or(|f| f.contains(field))
    }

    #[must_use]
    pub fn wants_body(&self) -> bool {
        self.includes("body_html")
    }

    #[must_use]
    pub fn wants_default_image(&self) -> bool {
        self.includes("default_image")
    }

    #[must_use]
    pub fn wants_variants(&self) -> bool {
        self.includes("variants")
    }

    #[must_use]
    pub fn wants_images(&self) -> bool {
        self.includes("images")
    }

    /// Drop top-level keys of a serialized view that were not requested.
    /// `id` is always kept.
    #[must_use]
    pub fn apply(&self, value: serde_json::Value) -> serde_json::Value {
        let Some(fields) = &self.fields else {
            return value;
        };
        match value {
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.into_iter()
                    .filter(|(k, _)| k == "id" || fields.contains(k))
                    .collect(),
            ),
            other => other,
        }
    }
}
