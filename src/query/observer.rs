//! Query Observer Module
//!
//! The binding a UI component holds while it is mounted: it subscribes to a
//! key, kicks off the first read and exposes typed `{data, is_loading,
//! is_error, error}` snapshots.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{QueryKey, QueryState, QueryStatus};
use crate::error::{QueryError, Result};
use crate::query::{FetchFn, QueryClient, QueryOptions, Subscription};

// == Query Result ==
/// Typed snapshot of a query, derived purely from the entry state.
pub struct QueryResult<T> {
    /// Last successful payload; may be stale while refetching or after an error
    pub data: Option<Arc<T>>,
    /// Entry status (`Idle` for disabled queries)
    pub status: QueryStatus,
    /// First fetch running with nothing to show
    pub is_loading: bool,
    /// Any fetch running, including background refetches
    pub is_fetching: bool,
    pub is_error: bool,
    pub error: Option<QueryError>,
}

impl<T> Clone for QueryResult<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            status: self.status,
            is_loading: self.is_loading,
            is_fetching: self.is_fetching,
            is_error: self.is_error,
            error: self.error.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for QueryResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("data", &self.data)
            .field("status", &self.status)
            .field("is_loading", &self.is_loading)
            .field("is_fetching", &self.is_fetching)
            .field("is_error", &self.is_error)
            .field("error", &self.error)
            .finish()
    }
}

impl<T: Any + Send + Sync> QueryResult<T> {
    /// Result of a query that has not started.
    pub fn idle() -> Self {
        Self {
            data: None,
            status: QueryStatus::Idle,
            is_loading: false,
            is_fetching: false,
            is_error: false,
            error: None,
        }
    }

    /// Derives a typed result from an entry state.
    ///
    /// A payload of another type means two bindings share a key with
    /// different value types; that is reported as a misuse error.
    pub fn from_state(key: &QueryKey, state: &QueryState) -> Self {
        let mut result = Self {
            data: None,
            status: state.status,
            is_loading: state.is_loading(),
            is_fetching: state.status == QueryStatus::Fetching,
            is_error: state.is_error(),
            error: state.error.clone(),
        };

        if let Some(value) = &state.value {
            match Arc::clone(value).downcast::<T>() {
                Ok(data) => result.data = Some(data),
                Err(_) => {
                    warn!(
                        key = %key,
                        expected = std::any::type_name::<T>(),
                        "cached value has a different type"
                    );
                    result.is_error = true;
                    result.error = Some(QueryError::Misuse(format!(
                        "cached value for {} is not a {}",
                        key,
                        std::any::type_name::<T>()
                    )));
                }
            }
        }
        result
    }
}

// == Query ==
/// A mounted observation of one query.
///
/// Created by [`Query::observe`]; dropping it unsubscribes. A query without
/// a key, or with `enabled = false`, creates no entry and never fetches.
pub struct Query<T> {
    client: QueryClient,
    key: Option<QueryKey>,
    fetch: FetchFn,
    options: QueryOptions,
    subscription: Option<Subscription>,
    startup_error: Option<QueryError>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("key", &self.key)
            .field("options", &self.options)
            .field("subscribed", &self.subscription.is_some())
            .finish()
    }
}

impl<T: Any + Send + Sync> Query<T> {
    // == Observe ==
    /// Mounts a query: subscribes to `key` and starts the first read.
    pub fn observe(
        client: &QueryClient,
        key: Option<QueryKey>,
        fetch: FetchFn,
        options: QueryOptions,
    ) -> Self {
        let mut query = Self {
            client: client.clone(),
            key,
            fetch,
            options,
            subscription: None,
            startup_error: None,
            _marker: PhantomData,
        };
        query.mount();
        query
    }

    fn mount(&mut self) {
        if !self.is_enabled() || self.subscription.is_some() {
            return;
        }
        self.attach();
    }

    // Subscribes to the key and starts the first read.
    fn attach(&mut self) {
        let Some(key) = &self.key else {
            return;
        };

        self.subscription = Some(self.client.subscribe(key, &self.options));
        self.startup_error = self
            .client
            .trigger(key, &self.fetch, &self.options, false)
            .err();
        if let Some(error) = &self.startup_error {
            warn!(key = %key, error = %error, "query could not start");
        }
    }

    /// Subscribes again when the observed entry was removed while mounted,
    /// re-creating it with a fresh read.
    fn reattach_if_removed(&mut self) {
        let removed = self
            .subscription
            .as_ref()
            .is_some_and(|subscription| !subscription.is_attached());
        if removed {
            debug!(key = ?self.key, "observed entry removed, resubscribing");
            self.attach();
        }
    }

    pub fn key(&self) -> Option<&QueryKey> {
        self.key.as_ref()
    }

    pub fn options(&self) -> &QueryOptions {
        &self.options
    }

    /// True when the query has a key and is not switched off.
    pub fn is_enabled(&self) -> bool {
        self.options.enabled && self.key.is_some()
    }

    // == Set Enabled ==
    /// Switches the query on or off.
    ///
    /// Enabling mounts the query and starts a read; disabling releases the
    /// subscription without touching cached data.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.options.enabled = enabled;
        if self.is_enabled() {
            self.mount();
        } else {
            self.subscription = None;
            self.startup_error = None;
        }
    }

    // == Result ==
    /// Current typed snapshot.
    ///
    /// Idle while the observed entry has been removed and not yet re-created
    /// by [`changed`](Self::changed), [`settled`](Self::settled) or
    /// [`refetch`](Self::refetch).
    pub fn result(&self) -> QueryResult<T> {
        let (Some(key), Some(subscription)) = (&self.key, &self.subscription) else {
            return QueryResult::idle();
        };
        if !subscription.is_attached() {
            return QueryResult::idle();
        }

        let mut result = QueryResult::from_state(key, &subscription.state());
        if let Some(error) = &self.startup_error {
            result.is_error = true;
            result.error = Some(error.clone());
        }
        result
    }

    // == Changed ==
    /// Waits for the next state change and returns the new snapshot.
    ///
    /// Fails if the query is disabled, or if its entry is removed while
    /// waiting; the next call re-creates the entry.
    pub async fn changed(&mut self) -> Result<QueryResult<T>> {
        self.reattach_if_removed();
        let key = self.key.clone();
        let subscription = self.active_subscription()?;
        let state = subscription.changed().await?;
        Ok(Self::derive(key.as_ref(), &state))
    }

    // == Settled ==
    /// Waits until no fetch is running and returns the snapshot.
    ///
    /// Returns immediately for disabled queries.
    pub async fn settled(&mut self) -> Result<QueryResult<T>> {
        self.reattach_if_removed();
        if self.subscription.is_none() || self.startup_error.is_some() {
            return Ok(self.result());
        }
        let key = self.key.clone();
        let subscription = self.active_subscription()?;
        let state = subscription
            .wait_for(|state| state.status != QueryStatus::Fetching)
            .await?;
        Ok(Self::derive(key.as_ref(), &state))
    }

    // == Refetch ==
    /// Fetches again regardless of freshness and returns the settled result.
    pub async fn refetch(&mut self) -> Result<QueryResult<T>> {
        let Some(key) = self.key.clone().filter(|_| self.is_enabled()) else {
            return Ok(self.result());
        };
        self.reattach_if_removed();
        // Errors are part of the entry state and surface through the result.
        let _ = self.client.refetch(&key, &self.fetch, &self.options).await;
        Ok(self.result())
    }

    fn active_subscription(&mut self) -> Result<&mut Subscription> {
        let key = self
            .key
            .as_ref()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "<none>".to_string());
        self.subscription
            .as_mut()
            .ok_or_else(|| QueryError::Misuse(format!("query {} is disabled", key)))
    }

    fn derive(key: Option<&QueryKey>, state: &QueryState) -> QueryResult<T> {
        match key {
            Some(key) => QueryResult::from_state(key, state),
            None => QueryResult::idle(),
        }
    }
}
