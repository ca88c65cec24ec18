//! Catalog Query - query cache and data-fetching bindings for a catalog client
//!
//! Serves reads from a keyed cache while fresh, deduplicates concurrent
//! fetches of the same key, keeps stale data visible on error and evicts
//! entries nobody observes.

pub mod cache;
pub mod client;
pub mod config;
pub mod devtools;
pub mod error;
pub mod hooks;
pub mod models;
pub mod query;
pub mod tasks;

pub use cache::{KeyPart, QueryKey, QueryState, QueryStatus};
pub use config::Config;
pub use devtools::AppState;
pub use error::{QueryError, Result};
pub use hooks::CatalogContext;
pub use query::{fetch_fn, FetchFn, Query, QueryClient, QueryOptions, QueryResult};
pub use tasks::spawn_gc_task;
