//! Fetch Function Module
//!
//! The pluggable asynchronous operation that loads a query's payload.

use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};

use crate::cache::{CachedValue, FetchOutcome, QueryKey};
use crate::error::QueryError;

/// Loads the payload for a key.
///
/// Must resolve with the decoded payload or fail with a [`QueryError`]; it
/// receives an owned key and holds no reference to cache internals.
pub type FetchFn = Arc<dyn Fn(QueryKey) -> BoxFuture<'static, FetchOutcome> + Send + Sync>;

/// Wraps a typed async closure into a [`FetchFn`].
///
/// ```ignore
/// let fetch = fetch_fn(|key| async move { api.get_products().await });
/// ```
pub fn fetch_fn<T, F, Fut>(f: F) -> FetchFn
where
    T: Send + Sync + 'static,
    F: Fn(QueryKey) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, QueryError>> + Send + 'static,
{
    Arc::new(move |key: QueryKey| {
        f(key)
            .map(|result| result.map(|value| Arc::new(value) as CachedValue))
            .boxed()
    })
}
