//! Devtools Handlers
//!
//! HTTP request handlers for each inspector endpoint.

use axum::{extract::State, Json};
use tokio::time::Instant;

use crate::error::{QueryError, Result};
use crate::models::{
    ClearResponse, HealthResponse, InvalidateRequest, InvalidateResponse, QueriesResponse,
    QuerySummary, RemoveRequest, RemoveResponse, StatsResponse,
};
use crate::query::QueryClient;

/// Application state shared across all handlers.
///
/// Holds a clone of the application's [`QueryClient`]; the inspector sees
/// the same cache as the bindings.
#[derive(Clone, Debug)]
pub struct AppState {
    pub client: QueryClient,
}

impl AppState {
    pub fn new(client: QueryClient) -> Self {
        Self { client }
    }
}

/// Handler for GET /queries
///
/// Lists every cache entry with its status and timing.
pub async fn queries_handler(State(state): State<AppState>) -> Json<QueriesResponse> {
    let now = Instant::now();
    let queries = state.client.inspect(|store| {
        store
            .entries()
            .map(|(key, entry)| QuerySummary::from_entry(key, entry, now))
            .collect()
    });
    Json(QueriesResponse::new(queries))
}

/// Handler for POST /queries/invalidate
///
/// Marks one key (`exact`) or every key under a prefix stale. Observed
/// entries refetch immediately.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(QueryError::Misuse(error_msg));
    }

    let key = req.query_key();
    let invalidated = if req.exact {
        if !state.client.invalidate(&key) {
            return Err(QueryError::NotFound(key.to_string()));
        }
        1
    } else {
        state.client.invalidate_matching(key.parts())
    };

    Ok(Json(InvalidateResponse::new(&key, invalidated)))
}

/// Handler for POST /queries/remove
///
/// Drops one entry regardless of observers.
pub async fn remove_handler(
    State(state): State<AppState>,
    Json(req): Json<RemoveRequest>,
) -> Result<Json<RemoveResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(QueryError::Misuse(error_msg));
    }

    let key = req.query_key();
    if !state.client.remove(&key) {
        return Err(QueryError::NotFound(key.to_string()));
    }
    Ok(Json(RemoveResponse::new(key)))
}

/// Handler for DELETE /queries
pub async fn clear_handler(State(state): State<AppState>) -> Json<ClearResponse> {
    Json(ClearResponse::new(state.client.clear()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse::from(state.client.stats()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
