use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        Multipart, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use utoipa::ToSchema;

use super::{ApiError, AppState, ErrorResponse};
use crate::{
    error::IngestError,
    ingester::Accepted,
    model::{IngestSummary, InventoryData, ProductsData, RecordKind},
    telemetry::RequestContext,
};

/// Single-file upload
#[derive(ToSchema)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

/// Combined upload; at least one part is required
#[derive(ToSchema)]
pub struct FilesForm {
    #[schema(value_type = Option<String>, format = Binary)]
    pub inventory: Option<Vec<u8>>,
    #[schema(value_type = Option<String>, format = Binary)]
    pub products: Option<Vec<u8>>,
}

#[utoipa::path(
    post,
    path = "/inventory/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Articles accepted for publishing", body = String),
        (status = 400, description = "Missing, empty or malformed file", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 415, description = "Not a multipart request", body = ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn upload_inventory(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, ApiError> {
    let accepted = upload(&state, &ctx, RecordKind::Inventory, &headers, multipart).await?;
    Ok(format!(
        "Inventory uploaded successfully. {} articles processed. TraceId: {}",
        accepted.count, ctx.trace_id
    ))
}

#[utoipa::path(
    post,
    path = "/products/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Products accepted for publishing", body = String),
        (status = 400, description = "Missing, empty or malformed file", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse),
        (status = 415, description = "Not a multipart request", body = ErrorResponse),
    ),
    tag = "products"
)]
pub async fn upload_products(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<String, ApiError> {
    let accepted = upload(&state, &ctx, RecordKind::Product, &headers, multipart).await?;
    Ok(format!(
        "Products uploaded successfully. {} products processed. TraceId: {}",
        accepted.count, ctx.trace_id
    ))
}

#[utoipa::path(
    post,
    path = "/inventory/data",
    request_body = InventoryData,
    responses(
        (status = 200, description = "Articles accepted for publishing", body = String),
        (status = 400, description = "Missing, empty or malformed inventory", body = ErrorResponse),
        (status = 415, description = "Body is not JSON", body = ErrorResponse),
    ),
    tag = "inventory"
)]
pub async fn inventory_data(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Result<Json<InventoryData>, JsonRejection>,
) -> Result<String, ApiError> {
    let kind = RecordKind::Inventory;
    let Json(data) = body.map_err(|e| reject(&state, &ctx, kind, json_error(e)))?;
    let accepted = state
        .ingester
        .ingest_inventory(&ctx, data)
        .map_err(|e| ApiError::new(e, &ctx.path))?;
    Ok(format!(
        "Inventory data processed successfully. {} articles received. TraceId: {}",
        accepted.count, ctx.trace_id
    ))
}

#[utoipa::path(
    post,
    path = "/products/data",
    request_body = ProductsData,
    responses(
        (status = 200, description = "Products accepted for publishing", body = String),
        (status = 400, description = "Missing, empty or malformed products", body = ErrorResponse),
        (status = 415, description = "Body is not JSON", body = ErrorResponse),
    ),
    tag = "products"
)]
pub async fn products_data(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Result<Json<ProductsData>, JsonRejection>,
) -> Result<String, ApiError> {
    let kind = RecordKind::Product;
    let Json(data) = body.map_err(|e| reject(&state, &ctx, kind, json_error(e)))?;
    let accepted = state
        .ingester
        .ingest_products(&ctx, data)
        .map_err(|e| ApiError::new(e, &ctx.path))?;
    Ok(format!(
        "Products data processed successfully. {} products received. TraceId: {}",
        accepted.count, ctx.trace_id
    ))
}

#[utoipa::path(
    post,
    path = "/files/ingest",
    request_body(content = FilesForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Counts of accepted records", body = IngestSummary),
        (status = 400, description = "No part supplied, or a part is malformed", body = ErrorResponse),
        (status = 413, description = "Upload too large", body = ErrorResponse),
        (status = 415, description = "Not a multipart request", body = ErrorResponse),
    ),
    tag = "files"
)]
pub async fn ingest_files(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<IngestSummary>, ApiError> {
    let parts = read_parts(&headers, multipart, &["inventory", "products"])
        .await
        .map_err(|e| reject_files(&state, &ctx, e))?;
    // batches keep publishing after the response is sent
    let (summary, _batches) = state
        .ingester
        .ingest_files(
            &ctx,
            parts.get("inventory").map(|b| b.as_ref()),
            parts.get("products").map(|b| b.as_ref()),
        )
        .map_err(|e| ApiError::new(e, &ctx.path))?;
    Ok(Json(summary))
}

#[utoipa::path(get, path = "/healthz", responses((status = 200, description = "Service is up")))]
pub async fn healthz() -> &'static str {
    "ok"
}

#[utoipa::path(get, path = "/metrics", responses((status = 200, description = "Prometheus metrics")))]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.ingester.metrics().gather(),
    )
}

async fn upload(
    state: &AppState,
    ctx: &RequestContext,
    kind: RecordKind,
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Accepted, ApiError> {
    let parts = read_parts(headers, multipart, &["file"])
        .await
        .map_err(|e| reject(state, ctx, kind, e))?;
    // the batch handle is dropped: sends complete in the background
    state
        .ingester
        .ingest_upload(ctx, kind, parts.get("file").map(|b| b.as_ref()))
        .map_err(|e| ApiError::new(e, &ctx.path))
}

/// Collects the named parts of a multipart body; other parts are skipped.
async fn read_parts(
    headers: &HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
    wanted: &[&str],
) -> Result<HashMap<String, Bytes>, IngestError> {
    let mut multipart = multipart.map_err(|e| multipart_rejection(headers, e))?;
    let mut parts = HashMap::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if !wanted.contains(&name.as_str()) {
            continue;
        }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        parts.insert(name, bytes);
    }
    Ok(parts)
}

/// A multipart/form-data request whose boundary cannot be parsed is malformed,
/// anything else is the wrong media type.
fn multipart_rejection(headers: &HeaderMap, rejection: MultipartRejection) -> IngestError {
    let is_form_data = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("multipart/form-data"));
    if is_form_data {
        IngestError::InvalidInput(format!("malformed multipart body: {}", rejection.body_text()))
    } else {
        IngestError::UnsupportedMediaType(rejection.body_text())
    }
}

fn multipart_error(e: MultipartError) -> IngestError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        IngestError::PayloadTooLarge(e.body_text())
    } else {
        IngestError::InvalidInput(format!("malformed multipart body: {}", e.body_text()))
    }
}

fn json_error(rejection: JsonRejection) -> IngestError {
    match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => IngestError::PayloadTooLarge(rejection.body_text()),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => {
            IngestError::UnsupportedMediaType(rejection.body_text())
        }
        _ => IngestError::decode("request body", rejection.body_text()),
    }
}

/// Failures raised before the ingester saw the request still count as rejected uploads.
fn reject(state: &AppState, ctx: &RequestContext, kind: RecordKind, err: IngestError) -> ApiError {
    reject_as(state, ctx, kind.as_str(), err)
}

fn reject_files(state: &AppState, ctx: &RequestContext, err: IngestError) -> ApiError {
    reject_as(state, ctx, "files", err)
}

fn reject_as(state: &AppState, ctx: &RequestContext, kind: &str, err: IngestError) -> ApiError {
    state
        .ingester
        .metrics()
        .record_rejected(kind, err.metric_label());
    tracing::warn!(kind, "rejected request: {err}");
    ApiError::new(err, &ctx.path)
}
