//! Queue names and payloads handed to out-of-band consumers.

use serde::{Deserialize, Serialize};

use crate::ports::EventQueue;

/// Downstream search-index sync events.
pub const SYNC_QUEUE: &str = "catalog:sync:product";
/// Tags that lost a product link and may now be orphaned.
pub const TAG_CLEANUP_QUEUE: &str = "catalog:tags:cleanup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncKind {
    Add,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub shop_id: i64,
    pub product_id: i64,
    pub event: SyncKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCleanupHint {
    pub shop_id: i64,
    pub tag_id: i64,
}

/// Which reconciliation step a failed URL belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    ProductImage,
    DefaultImage,
    VariantImage,
}

impl FailureKind {
    pub const ALL: [FailureKind; 3] = [
        FailureKind::ProductImage,
        FailureKind::DefaultImage,
        FailureKind::VariantImage,
    ];

    #[must_use]
    pub const fn queue(self) -> &'static str {
        match self {
            FailureKind::ProductImage => "catalog:media:failed:product-image",
            FailureKind::DefaultImage => "catalog:media:failed:default-image",
            FailureKind::VariantImage => "catalog:media:failed:variant-image",
        }
    }
}

/// A media operation left for the retry drain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMediaFailure {
    pub shop_id: i64,
    pub product_id: i64,
    #[serde(default)]
    pub variant_id: Option<i64>,
    pub url: String,
    #[serde(default)]
    pub attempts: u32,
}

/// Serialize `payload` onto `queue`. Failures are logged, never returned.
pub async fn emit<T: Serialize + Sync>(events: &dyn EventQueue, queue: &str, payload: &T) -> bool {
    let value = match serde_json::to_value(payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::error!(queue, error = %e, "failed to serialize queue payload");
            return false;
        }
    };
    match events.push(queue, value).await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(queue, error = %e, "failed to enqueue payload");
            false
        }
    }
}
