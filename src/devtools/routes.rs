//! Devtools Routes
//!
//! Configures the Axum router for the cache inspector.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    clear_handler, health_handler, invalidate_handler, queries_handler, remove_handler,
    stats_handler, AppState,
};

/// Creates the inspector router with all endpoints configured.
///
/// # Endpoints
/// - `GET /health` - Health check endpoint
/// - `GET /stats` - Cache statistics
/// - `GET /queries` - List cache entries
/// - `DELETE /queries` - Remove every entry
/// - `POST /queries/invalidate` - Invalidate a key or key prefix
/// - `POST /queries/remove` - Remove one entry
///
/// # Middleware
/// - CORS: Allows any origin so a browser panel can attach
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .route("/queries", get(queries_handler).delete(clear_handler))
        .route("/queries/invalidate", post(invalidate_handler))
        .route("/queries/remove", post(remove_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
