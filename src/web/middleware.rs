//! Request metrics middleware.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::metrics;

/// Record counter and latency for every request passing through the API
/// router.
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    metrics::record_http_request(
        &path,
        &method,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}
