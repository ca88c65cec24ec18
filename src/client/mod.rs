//! Client Module
//!
//! HTTP collaborator for the remote catalog API and the domain services
//! built on it. These are the fetch functions behind the query hooks.

mod admin;
mod catalog;
mod http;
mod products;

pub use admin::{AdminProductApi, SkuApi};
pub use catalog::{CategoryApi, OptionApi};
pub use http::{ApiClient, ApiResponse};
pub use products::ProductApi;
