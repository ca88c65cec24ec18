//! Cache Store Module
//!
//! Main cache engine: maps query keys to entries and owns every state
//! transition (subscription bookkeeping, fetch dedup, resolve/reject,
//! invalidation and garbage collection).
//!
//! All operations are synchronous. Callers hold the store lock only for the
//! duration of one call and never across an `.await`.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{
    CacheEntry, CacheStats, CachedValue, InFlight, KeyPart, QueryKey, QueryState, QueryStatus,
    SharedFetch,
};
use crate::error::QueryError;
use crate::query::{FetchFn, QueryOptions};

// == Fetch Ticket ==
/// Outcome of [`CacheStore::begin_fetch`].
#[derive(Debug, Clone)]
pub enum FetchTicket {
    /// A new fetch was registered; the caller's future is now in flight
    Started(InFlight),
    /// A fetch was already in flight; the caller must await it instead
    Joined(InFlight),
}

impl FetchTicket {
    pub fn in_flight(&self) -> &InFlight {
        match self {
            FetchTicket::Started(in_flight) | FetchTicket::Joined(in_flight) => in_flight,
        }
    }

    pub fn into_in_flight(self) -> InFlight {
        match self {
            FetchTicket::Started(in_flight) | FetchTicket::Joined(in_flight) => in_flight,
        }
    }
}

// == Invalidation ==
/// Outcome of invalidating one key.
#[derive(Clone)]
pub enum Invalidation {
    /// No entry for the key
    Missing,
    /// Entry marked stale; the next read refetches
    Marked,
    /// Entry marked stale and observed; the caller should refetch now
    Refetch(FetchFn),
}

impl std::fmt::Debug for Invalidation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Invalidation::Missing => f.write_str("Missing"),
            Invalidation::Marked => f.write_str("Marked"),
            Invalidation::Refetch(_) => f.write_str("Refetch"),
        }
    }
}

// == Settled ==
/// Follow-up owed once a fetch has been recorded, carried out by the caller
/// after it releases the store lock.
#[derive(Clone, Default)]
pub struct Settled {
    /// The entry is unobserved: arm an eviction timer for this long
    pub gc_time: Option<Duration>,
    /// The entry was invalidated mid-fetch and is observed: fetch it again
    pub refetch: Option<FetchFn>,
}

impl std::fmt::Debug for Settled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settled")
            .field("gc_time", &self.gc_time)
            .field("refetch", &self.refetch.is_some())
            .finish()
    }
}

// == Subscription Ticket ==
/// Returned by [`CacheStore::subscribe`]: identifies the entry generation the
/// observer attached to, plus its listener channel.
#[derive(Debug)]
pub struct SubscribeTicket {
    pub entry_id: u64,
    pub receiver: watch::Receiver<QueryState>,
}

// == Cache Store ==
/// Single source of truth mapping query keys to cache entries.
#[derive(Debug, Default)]
pub struct CacheStore {
    /// Key to entry storage
    entries: HashMap<QueryKey, CacheEntry>,
    /// Entry generation per key, used to ignore stale unsubscribes
    entry_ids: HashMap<QueryKey, u64>,
    /// Performance statistics
    stats: CacheStats,
    /// Source of entry and fetch ids
    next_id: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    // == Get Or Create ==
    /// Returns the entry for `key`, creating an idle one if absent.
    ///
    /// For an existing entry the caller's `stale_time` replaces the stored
    /// one and `gc_time` grows to the larger of the two.
    pub fn get_or_create(
        &mut self,
        key: &QueryKey,
        options: &QueryOptions,
        now: Instant,
    ) -> &mut CacheEntry {
        if !self.entries.contains_key(key) {
            let id = self.allocate_id();
            debug!(key = %key, "creating cache entry");
            self.entry_ids.insert(key.clone(), id);
            self.stats.set_total_entries(self.entries.len() + 1);
        }

        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(options, now));
        entry.stale_time = options.stale_time;
        entry.gc_time = entry.gc_time.max(options.gc_time);
        entry
    }

    // == Get ==
    /// Returns the entry for `key` without creating one.
    pub fn get(&self, key: &QueryKey) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// Returns a snapshot of the entry state for `key`.
    pub fn snapshot(&self, key: &QueryKey) -> Option<QueryState> {
        self.entries.get(key).map(|entry| entry.state.clone())
    }

    /// Returns the generation id of the live entry for `key`.
    pub fn entry_id(&self, key: &QueryKey) -> Option<u64> {
        self.entry_ids.get(key).copied()
    }

    /// Remembers the fetch function used for `key`, for later refetches.
    pub fn set_fetcher(&mut self, key: &QueryKey, fetcher: FetchFn) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.fetcher = Some(fetcher);
        }
    }

    // == Subscribe ==
    /// Registers an observer of `key`.
    ///
    /// Increments the subscriber count, cancels any pending eviction timer
    /// and returns a listener that receives every subsequent state.
    pub fn subscribe(
        &mut self,
        key: &QueryKey,
        options: &QueryOptions,
        now: Instant,
    ) -> SubscribeTicket {
        let entry = self.get_or_create(key, options, now);
        entry.subscriber_count += 1;
        entry.idle_since = None;
        if entry.cancel_gc_timer() {
            debug!(key = %key, "gc timer cancelled by resubscribe");
        }
        let receiver = entry.notifier.subscribe();
        let count = entry.subscriber_count;
        debug!(key = %key, subscribers = count, "subscribed");

        SubscribeTicket {
            entry_id: self.entry_id(key).unwrap_or_default(),
            receiver,
        }
    }

    // == Unsubscribe ==
    /// Releases one observer of `key`.
    ///
    /// Returns the entry's `gc_time` when the count reaches zero, so the
    /// caller can arm an eviction timer. Unsubscribes aimed at an entry that
    /// has since been removed (or replaced) are ignored.
    pub fn unsubscribe(&mut self, key: &QueryKey, entry_id: u64, now: Instant) -> Option<Duration> {
        if self.entry_id(key) != Some(entry_id) {
            debug!(key = %key, "unsubscribe for a removed entry ignored");
            return None;
        }
        let entry = self.entries.get_mut(key)?;
        entry.subscriber_count = entry.subscriber_count.saturating_sub(1);
        debug!(key = %key, subscribers = entry.subscriber_count, "unsubscribed");

        if entry.subscriber_count == 0 {
            entry.idle_since = Some(now);
            Some(entry.gc_time)
        } else {
            None
        }
    }

    /// Stores the eviction timer for `key`, replacing any previous one.
    ///
    /// The timer is aborted immediately if the key was resubscribed in the
    /// meantime.
    pub fn set_gc_timer(&mut self, key: &QueryKey, timer: JoinHandle<()>) {
        match self.entries.get_mut(key) {
            Some(entry) if entry.subscriber_count == 0 => {
                entry.cancel_gc_timer();
                entry.gc_timer = Some(timer);
                debug!(key = %key, gc_time = ?entry.gc_time, "gc timer armed");
            }
            _ => timer.abort(),
        }
    }

    // == Begin Fetch ==
    /// Registers a fetch for `key`, deduplicating against one in flight.
    ///
    /// If a fetch is already outstanding, `start` is not called and the
    /// existing handle is returned as [`FetchTicket::Joined`]. Otherwise
    /// `start` receives a fresh fetch id and must return the shared
    /// completion future, and the entry moves to `Fetching`.
    pub fn begin_fetch<F>(
        &mut self,
        key: &QueryKey,
        options: &QueryOptions,
        now: Instant,
        start: F,
    ) -> FetchTicket
    where
        F: FnOnce(u64) -> SharedFetch,
    {
        let fetch_id = self.allocate_id();
        let entry = self.get_or_create(key, options, now);

        if let Some(existing) = &entry.in_flight {
            let existing = existing.clone();
            debug!(key = %key, fetch_id = existing.id, "joining in-flight fetch");
            self.stats.record_dedup();
            return FetchTicket::Joined(existing);
        }

        let in_flight = InFlight {
            id: fetch_id,
            future: start(fetch_id),
        };
        entry.in_flight = Some(in_flight.clone());
        entry.state.status = QueryStatus::Fetching;
        entry.state.error = None;
        entry.state.invalidated = false;
        entry.publish();
        debug!(key = %key, fetch_id, "fetch started");
        self.stats.record_miss();

        FetchTicket::Started(in_flight)
    }

    // == Resolve ==
    /// Records a successful fetch and notifies listeners.
    ///
    /// Returns `None` if the entry is gone or no longer owned by `fetch_id`,
    /// otherwise the follow-up the caller owes the entry.
    pub fn resolve(
        &mut self,
        key: &QueryKey,
        fetch_id: u64,
        value: CachedValue,
        now: Instant,
    ) -> Option<Settled> {
        let entry = self.owned_entry(key, fetch_id)?;
        entry.in_flight = None;
        entry.state.value = Some(value);
        entry.state.error = None;
        entry.state.status = QueryStatus::Success;
        entry.state.fetched_at = Some(now);
        entry.publish();
        debug!(key = %key, fetch_id, "fetch resolved");
        Some(Self::follow_up(key, entry, now))
    }

    // == Reject ==
    /// Records a failed fetch and notifies listeners.
    ///
    /// A value from an earlier success is kept so it can still be shown.
    pub fn reject(
        &mut self,
        key: &QueryKey,
        fetch_id: u64,
        error: QueryError,
        now: Instant,
    ) -> Option<Settled> {
        let entry = self.owned_entry(key, fetch_id)?;
        entry.in_flight = None;
        entry.state.error = Some(error);
        entry.state.status = QueryStatus::Error;
        entry.publish();
        debug!(key = %key, fetch_id, "fetch rejected");
        let settled = Self::follow_up(key, entry, now);
        self.stats.record_fetch_error();
        Some(settled)
    }

    // An eviction timer that fired mid-fetch found the entry busy, so an
    // unobserved entry needs a new one. An observed entry invalidated while
    // the fetch ran still holds pre-invalidation data.
    fn follow_up(key: &QueryKey, entry: &mut CacheEntry, now: Instant) -> Settled {
        if entry.subscriber_count == 0 {
            entry.idle_since = Some(now);
            return Settled {
                gc_time: Some(entry.gc_time),
                refetch: None,
            };
        }
        let refetch = entry.fetcher.clone().filter(|_| entry.state.invalidated);
        if refetch.is_some() {
            debug!(key = %key, "invalidated during fetch, refetch owed");
        }
        Settled {
            gc_time: None,
            refetch,
        }
    }

    fn owned_entry(&mut self, key: &QueryKey, fetch_id: u64) -> Option<&mut CacheEntry> {
        let entry = self.entries.get_mut(key);
        match entry {
            Some(entry) if entry.in_flight.as_ref().map(|f| f.id) == Some(fetch_id) => Some(entry),
            _ => {
                debug!(key = %key, fetch_id, "discarding completion of a superseded fetch");
                None
            }
        }
    }

    // == Invalidate ==
    /// Marks `key` stale without dropping its data.
    ///
    /// Returns [`Invalidation::Refetch`] when the entry is observed and idle,
    /// meaning the caller should start a refetch right away. An entry already
    /// fetching stays marked; when that fetch settles, [`Settled::refetch`]
    /// asks for another one if the entry is still observed.
    pub fn invalidate(&mut self, key: &QueryKey) -> Invalidation {
        let Some(entry) = self.entries.get_mut(key) else {
            return Invalidation::Missing;
        };
        entry.state.invalidated = true;
        entry.publish();
        debug!(key = %key, subscribers = entry.subscriber_count, "invalidated");

        match &entry.fetcher {
            Some(fetcher) if entry.subscriber_count > 0 && entry.in_flight.is_none() => {
                Invalidation::Refetch(fetcher.clone())
            }
            _ => Invalidation::Marked,
        }
    }

    /// Invalidates every key starting with `prefix`.
    pub fn invalidate_matching(&mut self, prefix: &[KeyPart]) -> Vec<(QueryKey, Invalidation)> {
        let keys: Vec<QueryKey> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();

        keys.into_iter()
            .map(|key| {
                let outcome = self.invalidate(&key);
                (key, outcome)
            })
            .collect()
    }

    // == Is Stale ==
    /// Returns true when `entry` must be refetched on a read at `now`.
    pub fn is_stale(entry: &CacheEntry, now: Instant) -> bool {
        entry.is_stale(now)
    }

    /// Counts a read served from a fresh entry.
    pub fn record_hit(&mut self) {
        self.stats.record_hit();
    }

    // == Remove ==
    /// Removes the entry for `key`. Listeners see their channel close.
    pub fn remove(&mut self, key: &QueryKey) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.entry_ids.remove(key);
            self.stats.set_total_entries(self.entries.len());
            debug!(key = %key, "entry removed");
        }
        removed
    }

    // == Clear ==
    /// Removes every entry. Returns the number removed.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.entry_ids.clear();
        self.stats.set_total_entries(0);
        count
    }

    // == Garbage Collection ==
    /// Evicts `key` if it has been unobserved for its full `gc_time`.
    pub fn evict_if_idle(&mut self, key: &QueryKey, now: Instant) -> bool {
        let collectable = self
            .entries
            .get(key)
            .map(|entry| entry.is_collectable(now))
            .unwrap_or(false);
        if collectable {
            self.entries.remove(key);
            self.entry_ids.remove(key);
            self.stats.record_gc_eviction();
            self.stats.set_total_entries(self.entries.len());
            debug!(key = %key, "entry garbage collected");
        }
        collectable
    }

    /// Evicts every collectable entry. Returns the number removed.
    pub fn collect_garbage(&mut self, now: Instant) -> usize {
        let idle_keys: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_collectable(now))
            .map(|(key, _)| key.clone())
            .collect();

        idle_keys
            .iter()
            .filter(|key| self.evict_if_idle(key, now))
            .count()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    /// Iterates over all entries.
    pub fn entries(&self) -> impl Iterator<Item = (&QueryKey, &CacheEntry)> {
        self.entries.iter()
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
