//! Data models
//!
//! Catalog records decoded from the remote API, and the DTOs used for
//! serializing/deserializing devtools request and response bodies.

pub mod catalog;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use catalog::{
    Category, CategoryInput, OptionType, OptionTypeInput, OptionValue, OptionValueInput, Product,
    ProductInput, Sku, SkuInput,
};
pub use requests::{InvalidateRequest, RemoveRequest};
pub use responses::{
    ClearResponse, ErrorResponse, HealthResponse, InvalidateResponse, QueriesResponse,
    QuerySummary, RemoveResponse, StatsResponse,
};
