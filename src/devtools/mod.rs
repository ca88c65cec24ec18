//! Devtools Module
//!
//! HTTP inspector for a running [`QueryClient`](crate::query::QueryClient).
//!
//! # Endpoints
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Cache statistics
//! - `GET /queries` - List cache entries
//! - `DELETE /queries` - Remove every entry
//! - `POST /queries/invalidate` - Invalidate a key or key prefix
//! - `POST /queries/remove` - Remove one entry

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
