//! Cache Entry Module
//!
//! Defines the per-key state tracked by the store: fetched value, fetch
//! status, timestamps, observers and the shared in-flight request.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::QueryError;
use crate::query::{FetchFn, QueryOptions};

/// Type-erased payload shared between the store and every observer.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Final result of one fetch attempt.
pub type FetchOutcome = Result<CachedValue, QueryError>;

/// Future shared by every caller waiting on the same fetch.
pub type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

// == In-Flight Fetch ==
/// Handle on the single outstanding fetch for a key.
#[derive(Clone)]
pub struct InFlight {
    /// Monotonic id used to discard completions that no longer own the entry
    pub id: u64,
    /// Shared completion future
    pub future: SharedFetch,
}

impl fmt::Debug for InFlight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight").field("id", &self.id).finish()
    }
}

// == Query Status ==
/// Lifecycle status of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Idle,
    Fetching,
    Success,
    Error,
}

// == Query State ==
/// Immutable snapshot of an entry, published to listeners on every mutation.
#[derive(Clone)]
pub struct QueryState {
    /// Current lifecycle status
    pub status: QueryStatus,
    /// Last successfully fetched payload (kept through later failures)
    pub value: Option<CachedValue>,
    /// Last error, present only while `status` is `Error`
    pub error: Option<QueryError>,
    /// Completion time of the last successful fetch
    pub fetched_at: Option<Instant>,
    /// Set by invalidation; forces the next read to refetch
    pub invalidated: bool,
}

impl QueryState {
    /// State of a freshly created entry.
    pub fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            value: None,
            error: None,
            fetched_at: None,
            invalidated: false,
        }
    }

    /// True while the first fetch is running and nothing can be shown yet.
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Fetching && self.value.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

impl Default for QueryState {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Debug for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryState")
            .field("status", &self.status)
            .field("has_value", &self.value.is_some())
            .field("error", &self.error)
            .field("fetched_at", &self.fetched_at)
            .field("invalidated", &self.invalidated)
            .finish()
    }
}

// == Cache Entry ==
/// Stored state for one query key.
pub struct CacheEntry {
    /// Value, status, error and timestamps
    pub(crate) state: QueryState,
    /// Freshness window after `fetched_at`
    pub stale_time: Duration,
    /// Idle duration before an unobserved entry is evicted
    pub gc_time: Duration,
    /// Number of mounted observers
    pub(crate) subscriber_count: usize,
    /// The one outstanding fetch, if any
    pub(crate) in_flight: Option<InFlight>,
    /// Fetch function used by invalidation-triggered refetches
    pub(crate) fetcher: Option<FetchFn>,
    /// When the subscriber count last dropped to zero
    pub(crate) idle_since: Option<Instant>,
    /// Pending eviction timer
    pub(crate) gc_timer: Option<JoinHandle<()>>,
    /// Listener channel
    pub(crate) notifier: watch::Sender<QueryState>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an idle, unobserved entry.
    pub fn new(options: &QueryOptions, now: Instant) -> Self {
        let (notifier, _) = watch::channel(QueryState::idle());
        Self {
            state: QueryState::idle(),
            stale_time: options.stale_time,
            gc_time: options.gc_time,
            subscriber_count: 0,
            in_flight: None,
            fetcher: None,
            idle_since: Some(now),
            gc_timer: None,
            notifier,
        }
    }

    pub fn status(&self) -> QueryStatus {
        self.state.status
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count
    }

    pub fn is_fetching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Timing options currently stored on the entry, for refetches that no
    /// binding asked for.
    pub fn options(&self) -> QueryOptions {
        QueryOptions::default()
            .stale_time(self.stale_time)
            .gc_time(self.gc_time)
    }

    // == Is Stale ==
    /// Returns true when a read at `now` must refetch.
    ///
    /// Anything other than a successful, non-invalidated entry younger than
    /// `stale_time` is stale.
    pub fn is_stale(&self, now: Instant) -> bool {
        if self.state.status != QueryStatus::Success || self.state.invalidated {
            return true;
        }
        match self.state.fetched_at {
            Some(fetched_at) => now.saturating_duration_since(fetched_at) > self.stale_time,
            None => true,
        }
    }

    // == Age ==
    /// Time since the last successful fetch.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.state
            .fetched_at
            .map(|fetched_at| now.saturating_duration_since(fetched_at))
    }

    // == Is Collectable ==
    /// Returns true when the entry has been unobserved for at least `gc_time`
    /// and no fetch is running.
    pub fn is_collectable(&self, now: Instant) -> bool {
        if self.subscriber_count > 0 || self.in_flight.is_some() {
            return false;
        }
        match self.idle_since {
            Some(since) => now.saturating_duration_since(since) >= self.gc_time,
            None => false,
        }
    }

    /// Publishes the current state to every listener.
    pub(crate) fn publish(&self) {
        self.notifier.send_replace(self.state.clone());
    }

    /// Cancels the pending eviction timer, if any.
    pub(crate) fn cancel_gc_timer(&mut self) -> bool {
        match self.gc_timer.take() {
            Some(timer) => {
                timer.abort();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("state", &self.state)
            .field("stale_time", &self.stale_time)
            .field("gc_time", &self.gc_time)
            .field("subscriber_count", &self.subscriber_count)
            .field("in_flight", &self.in_flight)
            .field("idle_since", &self.idle_since)
            .finish()
    }
}

impl Drop for CacheEntry {
    fn drop(&mut self) {
        self.cancel_gc_timer();
    }
}
