//! Product aggregate handlers.
//!
//! Writes respond after commit with a fresh read of the product; media
//! reconciliation continues on the pipeline's worker.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use catalog_core::listing::{parse_handler_list, parse_id_list};
use catalog_core::{
    FieldMask, NewProduct, Pagination, ProductListFilter, ProductPatch, ProductView,
    PublishedStatus,
};
use catalog_pipeline::ProductLookup;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::middleware::RequestId;

use super::{map_pipeline_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Default, Deserialize)]
pub(super) struct FieldsQuery {
    pub fields: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListQuery {
    pub since_id: Option<i64>,
    /// Comma-separated ids.
    pub ids: Option<String>,
    pub created_at_min: Option<DateTime<Utc>>,
    pub created_at_max: Option<DateTime<Utc>>,
    pub updated_at_min: Option<DateTime<Utc>>,
    pub updated_at_max: Option<DateTime<Utc>>,
    pub published_at_min: Option<DateTime<Utc>>,
    pub published_at_max: Option<DateTime<Utc>>,
    pub published_status: Option<PublishedStatus>,
    pub title: Option<String>,
    /// Comma-separated handlers.
    pub handlers: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub new_version: bool,
    pub fields: Option<String>,
}

impl ListQuery {
    fn filter(&self) -> ProductListFilter {
        ProductListFilter {
            since_id: self.since_id.filter(|id| *id > 0),
            ids: self.ids.as_deref().map(parse_id_list).unwrap_or_default(),
            created_at_min: self.created_at_min,
            created_at_max: self.created_at_max,
            updated_at_min: self.updated_at_min,
            updated_at_max: self.updated_at_max,
            published_at_min: self.published_at_min,
            published_at_max: self.published_at_max,
            published_status: self.published_status.unwrap_or_default(),
            title: self
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(ToOwned::to_owned),
            handlers: self
                .handlers
                .as_deref()
                .map(parse_handler_list)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct ProductListData {
    products: Vec<Value>,
    count: i64,
}

fn masked(req_id: &str, view: &ProductView, mask: &FieldMask) -> Result<Value, ApiError> {
    serde_json::to_value(view).map(|v| mask.apply(v)).map_err(|e| {
        tracing::error!(error = %e, "failed to serialize product view");
        ApiError::new(req_id, "internal_error", "internal server error")
    })
}

async fn read_view(
    state: &AppState,
    req_id: &str,
    shop_id: i64,
    lookup: ProductLookup,
    mask: &FieldMask,
) -> Result<Value, ApiError> {
    let view = state
        .pipeline
        .reader()
        .get_product(shop_id, &lookup, mask)
        .await
        .map_err(|e| map_pipeline_error(req_id.to_owned(), &e))?;
    masked(req_id, &view, mask)
}

/// POST /api/v1/shops/{shop_id}/products
pub(super) async fn create_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop_id): Path<i64>,
    Json(mut body): Json<NewProduct>,
) -> Result<(StatusCode, Json<ApiResponse<Value>>), ApiError> {
    body.shop_id = shop_id;
    let created = state
        .pipeline
        .create_product(body)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    let data = read_view(
        &state,
        &req_id.0,
        shop_id,
        ProductLookup::Id(created.product_id),
        &FieldMask::all(),
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data,
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// GET /api/v1/shops/{shop_id}/products
pub(super) async fn list_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(shop_id): Path<i64>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<ProductListData>>, ApiError> {
    let mask = FieldMask::parse(query.fields.as_deref());
    let page = Pagination::new(query.page, query.limit, query.new_version);
    let result = state
        .pipeline
        .reader()
        .list_products(shop_id, &query.filter(), page, &mask)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    let products = result
        .products
        .iter()
        .map(|view| masked(&req_id.0, view, &mask))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(ApiResponse {
        data: ProductListData {
            products,
            count: result.count,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/shops/{shop_id}/products/{product_id}
pub(super) async fn get_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((shop_id, product_id)): Path<(i64, i64)>,
    Query(query): Query<FieldsQuery>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let mask = FieldMask::parse(query.fields.as_deref());
    let data = read_view(&state, &req_id.0, shop_id, ProductLookup::Id(product_id), &mask).await?;
    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// GET /api/v1/shops/{shop_id}/products/handle/{handler}
pub(super) async fn get_product_by_handler(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((shop_id, handler)): Path<(i64, String)>,
    Query(query): Query<FieldsQuery>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let mask = FieldMask::parse(query.fields.as_deref());
    let data = read_view(
        &state,
        &req_id.0,
        shop_id,
        ProductLookup::Handler(handler),
        &mask,
    )
    .await?;
    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// PUT /api/v1/shops/{shop_id}/products/{product_id}
pub(super) async fn update_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((shop_id, product_id)): Path<(i64, i64)>,
    Json(body): Json<ProductPatch>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    state
        .pipeline
        .update_product(shop_id, product_id, body)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    let data = read_view(
        &state,
        &req_id.0,
        shop_id,
        ProductLookup::Id(product_id),
        &FieldMask::all(),
    )
    .await?;
    Ok(Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/shops/{shop_id}/products/{product_id}
pub(super) async fn delete_product(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((shop_id, product_id)): Path<(i64, i64)>,
) -> Result<StatusCode, ApiError> {
    state
        .pipeline
        .delete_product(shop_id, product_id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0, &e))?;
    Ok(StatusCode::NO_CONTENT)
}
