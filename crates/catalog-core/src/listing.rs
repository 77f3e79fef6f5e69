//! Filters and paging for product list reads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;
/// Larger defaults used by the newer list endpoint.
pub const DEFAULT_PAGE_LIMIT_V2: u32 = 50;
pub const MAX_PAGE_LIMIT_V2: u32 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based.
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    /// A zero or missing limit takes the default; anything above the cap is
    /// clamped. Pages start at 1.
    #[must_use]
    pub fn new(page: Option<u32>, limit: Option<u32>, new_version: bool) -> Self {
        let (default, cap) = if new_version {
            (DEFAULT_PAGE_LIMIT_V2, MAX_PAGE_LIMIT_V2)
        } else {
            (DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT)
        };
        let limit = match limit {
            None | Some(0) => default,
            Some(l) => l.min(cap),
        };
        Self {
            page: page.unwrap_or(1).max(1),
            limit,
        }
    }

    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None, false)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishedStatus {
    Published,
    Unpublished,
    #[default]
    Any,
}

impl PublishedStatus {
    /// Stored status code to filter on, `None` for any.
    #[must_use]
    pub const fn status_code(self) -> Option<i16> {
        match self {
            PublishedStatus::Published => Some(1),
            PublishedStatus::Unpublished => Some(2),
            PublishedStatus::Any => None,
        }
    }
}

/// Predicates for a product list read. Empty collections and `None` mean
/// "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductListFilter {
    /// Only products with an id greater than this.
    pub since_id: Option<i64>,
    pub ids: Vec<i64>,
    pub created_at_min: Option<DateTime<Utc>>,
    pub created_at_max: Option<DateTime<Utc>>,
    pub updated_at_min: Option<DateTime<Utc>>,
    pub updated_at_max: Option<DateTime<Utc>>,
    pub published_at_min: Option<DateTime<Utc>>,
    pub published_at_max: Option<DateTime<Utc>>,
    pub published_status: PublishedStatus,
    /// Title prefix.
    pub title: Option<String>,
    pub handlers: Vec<String>,
}

/// Split a comma-separated id list, skipping anything that is not a
/// positive integer.
#[must_use]
pub fn parse_id_list(raw: &str) -> Vec<i64> {
    raw.split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .collect()
}

#[must_use]
pub fn parse_handler_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
