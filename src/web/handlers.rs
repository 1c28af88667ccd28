//! Batch endpoint handlers.
//!
//! The manager returns hits unordered; `batch_get` re-aligns them to the
//! request order using `(cache_name, key)` as the join key, filling absent
//! slots with `f:false, v:null` so the response always matches the request
//! in length and order.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::types::{CacheEntry, CacheEntryHit, CacheId};
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchGetRequest {
    pub requests: Vec<CacheId>,
}

#[derive(Debug, Deserialize)]
pub struct BatchPutRequest {
    pub requests: Vec<CacheEntry>,
}

#[derive(Debug, Serialize)]
pub struct BatchGetResponse {
    pub results: Vec<CacheEntryHit>,
}

/// Client-visible protocol errors. Everything else never leaves the core.
#[derive(Debug)]
pub enum ApiError {
    EmptyBatch,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::EmptyBatch => (StatusCode::BAD_REQUEST, "empty requests").into_response(),
        }
    }
}

/// POST /api/cache/batch/get
pub async fn batch_get(
    State(state): State<AppState>,
    Json(request): Json<BatchGetRequest>,
) -> Result<Json<BatchGetResponse>, ApiError> {
    if request.requests.is_empty() {
        return Err(ApiError::EmptyBatch);
    }

    let hits = state.adapter.get_all(&request.requests).await;
    debug!(
        requests = request.requests.len(),
        hits = hits.len(),
        "processed batch get"
    );

    let mut by_id: HashMap<(String, String), CacheEntryHit> = hits
        .into_iter()
        .map(|hit| ((hit.cache_name.clone(), hit.key.clone()), hit))
        .collect();

    let results = request
        .requests
        .iter()
        .map(|id| {
            by_id
                .remove(&(id.cache_name.clone(), id.key.clone()))
                .unwrap_or_else(|| CacheEntryHit::not_found(id))
        })
        .collect();

    Ok(Json(BatchGetResponse { results }))
}

/// POST /api/cache/batch/put
pub async fn batch_put(
    State(state): State<AppState>,
    Json(request): Json<BatchPutRequest>,
) -> Result<StatusCode, ApiError> {
    if request.requests.is_empty() {
        return Err(ApiError::EmptyBatch);
    }

    let count = request.requests.len();
    state.adapter.put_all(request.requests).await;
    debug!(requests = count, "processed batch put");
    Ok(StatusCode::OK)
}

/// POST /api/cache/batch/delete
pub async fn batch_delete(
    State(state): State<AppState>,
    Json(request): Json<BatchGetRequest>,
) -> Result<StatusCode, ApiError> {
    if request.requests.is_empty() {
        return Err(ApiError::EmptyBatch);
    }

    let count = request.requests.len();
    state.adapter.evict_all(request.requests).await;
    debug!(requests = count, "processed batch delete");
    Ok(StatusCode::OK)
}
