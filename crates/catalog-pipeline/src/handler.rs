use catalog_core::normalize_title;
use catalog_core::slug::{handler_with_count, handler_with_id};
use sqlx::PgPool;

/// A generated handler and the origin slug it was counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handler {
    pub handler: String,
    pub origin: String,
}

/// Derive a shop-unique handler for `title`.
///
/// Best effort: the count and the later insert are not atomic, so two
/// concurrent creates of the same title can still collide. Lookup failures
/// are logged and the best candidate so far is returned.
pub async fn generate_unique(pool: &PgPool, shop_id: i64, title: &str) -> Handler {
    let origin = normalize_title(title);
    let handler = unique_for_origin(pool, shop_id, &origin).await;
    Handler { handler, origin }
}

async fn unique_for_origin(pool: &PgPool, shop_id: i64, origin: &str) -> String {
    let count = match catalog_db::count_by_handler_origin(pool, shop_id, origin).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!(shop_id, origin, error = %e, "handler origin count failed");
            return origin.to_owned();
        }
    };
    if count == 0 {
        return origin.to_owned();
    }

    let candidate = handler_with_count(origin, count);
    match catalog_db::find_live_by_handler(pool, shop_id, &candidate).await {
        Ok(Some(existing)) => handler_with_id(origin, existing.id),
        Ok(None) => candidate,
        Err(e) => {
            tracing::warn!(shop_id, handler = %candidate, error = %e, "handler re-check failed");
            candidate
        }
    }
}
