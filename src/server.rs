//! HTTP surface: upload and data endpoints, health, metrics and API docs
pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::Redirect,
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{ingester::Ingester, telemetry::trace_middleware};

pub use error::{ApiError, ErrorResponse};

/// Shared state of every handler
#[derive(Clone)]
pub struct AppState {
    pub ingester: Arc<Ingester>,
}

#[derive(OpenApi)]
#[openapi(
    info(title = "warehouse-ingest", description = "Warehouse inventory and product ingestion"),
    paths(
        handlers::upload_inventory,
        handlers::upload_products,
        handlers::inventory_data,
        handlers::products_data,
        handlers::ingest_files,
        handlers::healthz,
        handlers::metrics,
    ),
    components(schemas(
        crate::model::InventoryData,
        crate::model::InventoryItem,
        crate::model::ProductsData,
        crate::model::Product,
        crate::model::ArticleAmount,
        crate::model::IngestSummary,
        handlers::UploadForm,
        handlers::FilesForm,
        ErrorResponse,
    ))
)]
pub struct ApiDoc;

fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/inventory/upload", post(handlers::upload_inventory))
        .route("/products/upload", post(handlers::upload_products))
        .route("/inventory/data", post(handlers::inventory_data))
        .route("/products/data", post(handlers::products_data))
        .route("/files/ingest", post(handlers::ingest_files))
}

/// Builds the application router. Bodies larger than `max_body_bytes` are answered with 413.
pub fn router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .merge(ingest_routes())
        .nest("/api/v1", ingest_routes())
        .route("/api/files/ingest", post(handlers::ingest_files))
        .route("/healthz", get(handlers::healthz))
        .route("/metrics", get(handlers::metrics))
        .route("/", get(|| async { Redirect::to("/swagger-ui") }))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn(trace_middleware))
        .with_state(state)
}
