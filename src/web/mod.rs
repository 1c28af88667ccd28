//! HTTP framing layer.
//!
//! Two routers on two listeners: the batch API (with body limits, gzip in
//! both directions and request metrics) and a bare metrics endpoint kept
//! free of middleware so scrapes stay cheap.

pub mod handlers;
pub mod middleware;
pub mod state;

use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::predicate::SizeAbove;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Maximum accepted request body: 5 MiB.
pub const MAX_BODY_BYTES: usize = 5 << 20;

/// Responses below this many bytes are not worth compressing.
pub const GZIP_THRESHOLD: u16 = 500;

pub const BATCH_GET_PATH: &str = "/api/cache/batch/get";
pub const BATCH_PUT_PATH: &str = "/api/cache/batch/put";
pub const BATCH_DELETE_PATH: &str = "/api/cache/batch/delete";

/// Build the batch API router.
pub fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route(BATCH_GET_PATH, post(handlers::batch_get))
        .route(BATCH_PUT_PATH, post(handlers::batch_put))
        .route(BATCH_DELETE_PATH, post(handlers::batch_delete))
        .layer(axum::middleware::from_fn(middleware::track_metrics))
        .layer(CompressionLayer::new().compress_when(SizeAbove::new(GZIP_THRESHOLD)))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Build the metrics router served on its own port.
pub fn build_metrics_router() -> Router {
    Router::new()
        .route("/metrics", get(serve_metrics))
        .route("/metrics/health", get(serve_health))
}

async fn serve_metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::encode(),
    )
}

async fn serve_health() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"status":"UP"}"#,
    )
}
