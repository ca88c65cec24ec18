//! Query Module
//!
//! Fetch orchestration on top of the cache store: per-key read lifecycle,
//! typed observers and the optional retry decorator.

mod client;
mod fetch;
mod observer;
mod options;
mod retry;

pub use client::{FetchTrigger, QueryClient, Subscription};
pub use fetch::{fetch_fn, FetchFn};
pub use observer::{Query, QueryResult};
pub use options::{QueryOptions, DEFAULT_GC_TIME, DEFAULT_STALE_TIME};
pub use retry::RetryPolicy;
