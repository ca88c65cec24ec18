//! Cache Module
//!
//! Query-keyed cache entries with fetch deduplication, staleness tracking
//! and idle-time garbage collection.

mod entry;
mod key;
mod stats;
mod store;


// Re-export public types
pub use entry::{
    CacheEntry, CachedValue, FetchOutcome, InFlight, QueryState, QueryStatus, SharedFetch,
};
pub use key::{KeyPart, QueryKey};
pub use stats::CacheStats;
pub use store::{CacheStore, FetchTicket, Invalidation, Settled, SubscribeTicket};
