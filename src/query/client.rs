//! Query Client Module
//!
//! Application-wide handle on the cache store. Drives each key's read
//! lifecycle: cache hit, fetch, deduplicated join, and routing the fetch
//! outcome back into the store.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{
    CacheStats, CacheStore, CachedValue, FetchTicket, InFlight, Invalidation, KeyPart, QueryKey,
    QueryState, Settled, SharedFetch,
};
use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::query::{FetchFn, QueryOptions};

// == Fetch Trigger ==
/// What a read decided to do.
#[derive(Clone)]
pub enum FetchTrigger {
    /// Query disabled; nothing touched
    Disabled,
    /// Fresh cached value served without a network call
    Fresh(Option<CachedValue>),
    /// A new fetch was issued
    Started(InFlight),
    /// An in-flight fetch for the same key was joined
    Joined(InFlight),
}

impl std::fmt::Debug for FetchTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchTrigger::Disabled => f.write_str("Disabled"),
            FetchTrigger::Fresh(_) => f.write_str("Fresh"),
            FetchTrigger::Started(in_flight) => f.debug_tuple("Started").field(in_flight).finish(),
            FetchTrigger::Joined(in_flight) => f.debug_tuple("Joined").field(in_flight).finish(),
        }
    }
}

impl From<FetchTicket> for FetchTrigger {
    fn from(ticket: FetchTicket) -> Self {
        match ticket {
            FetchTicket::Started(in_flight) => FetchTrigger::Started(in_flight),
            FetchTicket::Joined(in_flight) => FetchTrigger::Joined(in_flight),
        }
    }
}

// == Query Client ==
/// Shared handle on one [`CacheStore`].
///
/// Construct one at the application root and pass clones to every binding;
/// all clones see the same cache.
#[derive(Clone)]
pub struct QueryClient {
    store: Arc<Mutex<CacheStore>>,
    defaults: QueryOptions,
}

impl std::fmt::Debug for QueryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClient")
            .field("defaults", &self.defaults)
            .field("entries", &self.lock().len())
            .finish()
    }
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new(QueryOptions::default())
    }
}

fn lock_store(store: &Mutex<CacheStore>) -> MutexGuard<'_, CacheStore> {
    // Store operations never leave an entry half-updated, so a poisoned lock
    // still guards consistent data.
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

impl QueryClient {
    // == Constructor ==
    /// Creates a client with an empty cache and the given default options.
    pub fn new(defaults: QueryOptions) -> Self {
        Self {
            store: Arc::new(Mutex::new(CacheStore::new())),
            defaults,
        }
    }

    /// Creates a client whose defaults come from the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.query_defaults.clone())
    }

    /// Options applied by bindings that do not override them.
    pub fn defaults(&self) -> &QueryOptions {
        &self.defaults
    }

    fn lock(&self) -> MutexGuard<'_, CacheStore> {
        lock_store(&self.store)
    }

    // == Trigger ==
    /// Synchronously decides between cache hit and fetch for `key`.
    ///
    /// With `force` the freshness check is skipped, but an in-flight fetch
    /// is still joined rather than duplicated. Requires a tokio runtime
    /// when a fetch has to be issued.
    pub fn trigger(
        &self,
        key: &QueryKey,
        fetch: &FetchFn,
        options: &QueryOptions,
        force: bool,
    ) -> Result<FetchTrigger> {
        if !options.enabled {
            debug!(key = %key, "query disabled");
            return Ok(FetchTrigger::Disabled);
        }

        let now = Instant::now();
        let mut store = self.lock();
        let entry = store.get_or_create(key, options, now);
        let fresh = !force && !entry.is_stale(now);
        let cached = entry.state().value.clone();
        store.set_fetcher(key, Arc::clone(fetch));

        if fresh {
            debug!(key = %key, "cache hit");
            store.record_hit();
            return Ok(FetchTrigger::Fresh(cached));
        }

        let runtime = Handle::try_current().map_err(|_| {
            QueryError::Misuse(format!("query {} triggered outside a tokio runtime", key))
        })?;

        let ticket = store.begin_fetch(key, options, now, |fetch_id| {
            spawn_fetch(&runtime, &self.store, key.clone(), fetch_id, Arc::clone(fetch))
        });
        Ok(ticket.into())
    }

    // == Ensure Fresh ==
    /// Returns the value for `key`, fetching it unless a fresh one is cached.
    ///
    /// Concurrent callers for the same key share a single fetch and all
    /// receive the same value or error. Returns `Ok(None)` when disabled.
    pub async fn ensure_fresh(
        &self,
        key: &QueryKey,
        fetch: &FetchFn,
        options: &QueryOptions,
    ) -> Result<Option<CachedValue>> {
        let trigger = self.trigger(key, fetch, options, false)?;
        Self::settle(trigger).await
    }

    // == Refetch ==
    /// Fetches `key` regardless of freshness (joining one already in flight).
    pub async fn refetch(
        &self,
        key: &QueryKey,
        fetch: &FetchFn,
        options: &QueryOptions,
    ) -> Result<Option<CachedValue>> {
        let trigger = self.trigger(key, fetch, options, true)?;
        Self::settle(trigger).await
    }

    async fn settle(trigger: FetchTrigger) -> Result<Option<CachedValue>> {
        match trigger {
            FetchTrigger::Disabled => Ok(None),
            FetchTrigger::Fresh(value) => Ok(value),
            FetchTrigger::Started(in_flight) | FetchTrigger::Joined(in_flight) => {
                in_flight.future.await.map(Some)
            }
        }
    }

    // == Subscribe ==
    /// Registers an observer of `key` and returns its guard.
    ///
    /// Dropping the guard releases the observer; the last release arms the
    /// entry's eviction timer.
    pub fn subscribe(&self, key: &QueryKey, options: &QueryOptions) -> Subscription {
        let ticket = self.lock().subscribe(key, options, Instant::now());
        Subscription {
            store: Arc::downgrade(&self.store),
            key: key.clone(),
            entry_id: ticket.entry_id,
            receiver: ticket.receiver,
        }
    }

    // == Invalidate ==
    /// Marks `key` stale; observed entries are refetched immediately.
    ///
    /// Returns false if no entry exists for `key`.
    pub fn invalidate(&self, key: &QueryKey) -> bool {
        let outcome = self.lock().invalidate(key);
        self.apply_invalidation(key, outcome)
    }

    /// Invalidates every key starting with `prefix`. Returns how many
    /// entries were marked.
    pub fn invalidate_matching(&self, prefix: &[KeyPart]) -> usize {
        let outcomes = self.lock().invalidate_matching(prefix);
        outcomes
            .into_iter()
            .filter(|(key, outcome)| self.apply_invalidation(key, outcome.clone()))
            .count()
    }

    fn apply_invalidation(&self, key: &QueryKey, outcome: Invalidation) -> bool {
        match outcome {
            Invalidation::Missing => false,
            Invalidation::Marked => true,
            Invalidation::Refetch(fetch) => {
                let options = self.options_for(key);
                if let Err(e) = self.trigger(key, &fetch, &options, true) {
                    warn!(key = %key, error = %e, "refetch after invalidation not started");
                }
                true
            }
        }
    }

    fn options_for(&self, key: &QueryKey) -> QueryOptions {
        let store = self.lock();
        match store.get(key) {
            Some(entry) => entry.options(),
            None => self.defaults.clone(),
        }
    }

    // == Direct Access ==
    /// Returns the current state of `key`, if cached.
    pub fn snapshot(&self, key: &QueryKey) -> Option<QueryState> {
        self.lock().snapshot(key)
    }

    /// Returns the cached value of `key` as `T`, if present and of that type.
    pub fn get_query_data<T>(&self, key: &QueryKey) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.snapshot(key)?.value?.downcast::<T>().ok()
    }

    /// Removes `key` from the cache.
    pub fn remove(&self, key: &QueryKey) -> bool {
        self.lock().remove(key)
    }

    /// Removes every entry. Returns the number removed.
    pub fn clear(&self) -> usize {
        self.lock().clear()
    }

    /// Evicts every idle entry past its `gc_time`.
    pub fn collect_garbage(&self) -> usize {
        self.lock().collect_garbage(Instant::now())
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs `f` with read access to the store.
    pub fn inspect<R>(&self, f: impl FnOnce(&CacheStore) -> R) -> R {
        f(&self.lock())
    }
}

// == Fetch Driver ==
/// Runs `fetch` on its own task and records the outcome in the store.
///
/// The task is independent of whoever awaits the returned future, so a
/// fetch keeps running after all observers go away.
fn spawn_fetch(
    runtime: &Handle,
    store: &Arc<Mutex<CacheStore>>,
    key: QueryKey,
    fetch_id: u64,
    fetch: FetchFn,
) -> SharedFetch {
    let store = Arc::clone(store);
    let task_runtime = runtime.clone();
    let task_key = key.clone();
    let task = runtime.spawn(async move {
        let key = task_key;
        let outcome = match AssertUnwindSafe(fetch(key.clone())).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => Err(QueryError::Aborted(format!("fetch for {} panicked", key))),
        };

        let settled = {
            let mut guard = lock_store(&store);
            let now = Instant::now();
            match &outcome {
                Ok(value) => guard.resolve(&key, fetch_id, Arc::clone(value), now),
                Err(error) => {
                    warn!(key = %key, error = %error, "fetch failed");
                    guard.reject(&key, fetch_id, error.clone(), now)
                }
            }
        };
        if let Some(settled) = settled {
            follow_up(&task_runtime, &store, &key, settled);
        }
        outcome
    });

    async move {
        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(QueryError::Aborted(format!("fetch for {}: {}", key, e))),
        }
    }
    .boxed()
    .shared()
}

/// Carries out what the store asked for after recording a fetch outcome.
fn follow_up(runtime: &Handle, store: &Arc<Mutex<CacheStore>>, key: &QueryKey, settled: Settled) {
    if let Some(gc_time) = settled.gc_time {
        arm_gc_timer(store, key.clone(), gc_time);
    }
    let Some(fetch) = settled.refetch else {
        return;
    };

    let mut guard = lock_store(store);
    let Some(options) = guard.get(key).map(|entry| entry.options()) else {
        return;
    };
    debug!(key = %key, "refetching entry invalidated during its fetch");
    guard.begin_fetch(key, &options, Instant::now(), |fetch_id| {
        spawn_fetch(runtime, store, key.clone(), fetch_id, fetch)
    });
}

// == Subscription ==
/// Scoped observation of one key.
///
/// Holds the entry's listener channel. Dropping it releases the observer
/// exactly once.
#[derive(Debug)]
pub struct Subscription {
    store: Weak<Mutex<CacheStore>>,
    key: QueryKey,
    entry_id: u64,
    receiver: watch::Receiver<QueryState>,
}

impl Subscription {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Latest published state of the entry.
    pub fn state(&self) -> QueryState {
        self.receiver.borrow().clone()
    }

    /// False once the observed entry has been removed (or replaced by a new
    /// entry under the same key).
    pub fn is_attached(&self) -> bool {
        let Some(store) = self.store.upgrade() else {
            return false;
        };
        let current = lock_store(&store).entry_id(&self.key);
        current == Some(self.entry_id)
    }

    /// Waits for the next state change.
    ///
    /// Fails with [`QueryError::NotFound`] once the entry has been removed.
    pub async fn changed(&mut self) -> Result<QueryState> {
        self.receiver
            .changed()
            .await
            .map_err(|_| QueryError::NotFound(self.key.to_string()))?;
        Ok(self.receiver.borrow_and_update().clone())
    }

    /// Waits until the state satisfies `predicate`.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&QueryState) -> bool) -> Result<QueryState> {
        let key = &self.key;
        self.receiver
            .wait_for(predicate)
            .await
            .map(|state| state.clone())
            .map_err(|_| QueryError::NotFound(key.to_string()))
    }

    /// Explicitly ends the observation.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(store) = self.store.upgrade() else {
            return;
        };
        let gc_time = lock_store(&store).unsubscribe(&self.key, self.entry_id, Instant::now());
        if let Some(gc_time) = gc_time {
            arm_gc_timer(&store, self.key.clone(), gc_time);
        }
    }
}

/// Schedules eviction of `key` after `gc_time` of inactivity.
///
/// Outside a tokio runtime no timer is armed; the periodic sweep collects
/// the entry instead.
fn arm_gc_timer(store: &Arc<Mutex<CacheStore>>, key: QueryKey, gc_time: Duration) {
    let Ok(runtime) = Handle::try_current() else {
        debug!(key = %key, "no runtime for gc timer, leaving entry to the sweep");
        return;
    };
    let weak = Arc::downgrade(store);
    let timer_key = key.clone();
    let timer = runtime.spawn(async move {
        tokio::time::sleep(gc_time).await;
        if let Some(store) = weak.upgrade() {
            lock_store(&store).evict_if_idle(&timer_key, Instant::now());
        }
    });
    lock_store(store).set_gc_timer(&key, timer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::fetch_fn;
    use crate::query_key;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_fetch(calls: Arc<AtomicUsize>, value: &'static str) -> FetchFn {
        fetch_fn(move |_| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(value.to_string())
            }
        })
    }

    fn options() -> QueryOptions {
        QueryOptions::default()
            .stale_time(Duration::from_millis(100))
            .gc_time(Duration::from_millis(1000))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ensure_fresh_fetches_then_hits() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), "Shoe");
        let key = query_key!["product", "42"];

        let value = client.ensure_fresh(&key, &fetch, &options()).await.unwrap();
        assert_eq!(*value.unwrap().downcast::<String>().unwrap(), "Shoe");

        let value = client.ensure_fresh(&key, &fetch, &options()).await.unwrap();
        assert!(value.is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = client.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_does_nothing() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), "x");
        let key = query_key!["product", None::<&str>];

        let value = client
            .ensure_fresh(&key, &fetch, &options().enabled(false))
            .await
            .unwrap();
        assert!(value.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(client.snapshot(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_bypasses_freshness() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), "x");
        let key = query_key!["products", "all"];

        client.ensure_fresh(&key, &fetch, &options()).await.unwrap();
        client.refetch(&key, &fetch, &options()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_fetch_is_captured() {
        let client = QueryClient::default();
        let key = query_key!["products", "all"];
        let fetch = fetch_fn(|_| async {
            if true {
                panic!("boom");
            }
            Ok(0u8)
        });

        let result = client.ensure_fresh(&key, &fetch, &options()).await;
        assert!(matches!(result, Err(QueryError::Aborted(_))));
        let state = client.snapshot(&key).unwrap();
        assert!(state.is_error());
    }

    #[test]
    fn test_trigger_outside_runtime_is_misuse() {
        let client = QueryClient::default();
        let fetch = fetch_fn(|_| async { Ok(1u8) });

        let result = client.trigger(&query_key!["x"], &fetch, &options(), false);
        assert!(matches!(result, Err(QueryError::Misuse(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_drop_arms_gc() {
        let client = QueryClient::default();
        let key = query_key!["products", "all"];

        let subscription = client.subscribe(&key, &options());
        assert_eq!(client.len(), 1);
        drop(subscription);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(client.len(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(client.len(), 0);
        assert_eq!(client.stats().gc_evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_cancels_gc() {
        let client = QueryClient::default();
        let key = query_key!["products", "all"];

        drop(client.subscribe(&key, &options()));
        tokio::time::sleep(Duration::from_millis(500)).await;
        let _again = client.subscribe(&key, &options());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(client.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_refetches_observed_query() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), "x");
        let key = query_key!["products", "all"];

        let mut subscription = client.subscribe(&key, &options());
        client.ensure_fresh(&key, &fetch, &options()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert!(client.invalidate(&key));
        let state = subscription
            .wait_for(|s| s.status == crate::cache::QueryStatus::Success && !s.invalidated)
            .await
            .unwrap();
        assert!(state.has_value());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_unobserved_defers_refetch() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let fetch = counting_fetch(calls.clone(), "x");
        let key = query_key!["products", "all"];

        client.ensure_fresh(&key, &fetch, &options()).await.unwrap();
        assert!(client.invalidate(&key));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        client.ensure_fresh(&key, &fetch, &options()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_query_data_typed() {
        let client = QueryClient::default();
        let key = query_key!["products", "all"];
        let fetch = fetch_fn(|_| async { Ok(vec![1u32, 2, 3]) });

        client.ensure_fresh(&key, &fetch, &options()).await.unwrap();
        assert_eq!(
            client.get_query_data::<Vec<u32>>(&key).as_deref(),
            Some(&vec![1, 2, 3])
        );
        assert!(client.get_query_data::<String>(&key).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscription_wakes_on_mutation() {
        let client = QueryClient::default();
        let key = query_key!["categories"];
        let mut subscription = client.subscribe(&key, &options());

        let mut changed = tokio_test::task::spawn(subscription.changed());
        tokio_test::assert_pending!(changed.poll());

        client.invalidate(&key);
        assert!(changed.is_woken());
        let state = tokio_test::assert_ready_ok!(changed.poll());
        assert!(state.invalidated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_released_mid_fetch_is_collected_after_it_settles() {
        let client = QueryClient::default();
        let key = query_key!["product", "42"];
        let options = options().gc_time(Duration::from_millis(500));
        let fetch = fetch_fn(|_| async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok("slow".to_string())
        });

        let subscription = client.subscribe(&key, &options);
        client.trigger(&key, &fetch, &options, false).unwrap();
        drop(subscription);

        // The first timer fires at 500ms and finds the fetch still running.
        tokio::time::sleep(Duration::from_millis(2_100)).await;
        assert_eq!(client.len(), 1);
        assert!(client.snapshot(&key).unwrap().has_value());

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(client.is_empty());
        assert_eq!(client.stats().gc_evictions, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_during_fetch_refetches_observed_query() {
        let client = QueryClient::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let fetch = fetch_fn(move |_| {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(format!("v{}", n))
            }
        });
        let key = query_key!["categories"];

        let mut subscription = client.subscribe(&key, &options());
        client.trigger(&key, &fetch, &options(), false).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(client.invalidate(&key));

        let state = subscription
            .wait_for(|s| s.status == crate::cache::QueryStatus::Success && !s.invalidated)
            .await
            .unwrap();
        let value = state.value.unwrap().downcast::<String>().unwrap();
        assert_eq!(value.as_str(), "v1");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!client.snapshot(&key).unwrap().invalidated);
    }
}
