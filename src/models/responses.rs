//! Response DTOs for the devtools API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use tokio::time::Instant;

use crate::cache::{CacheEntry, CacheStats, QueryKey, QueryStatus};

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Reads served from a fresh entry
    pub hits: u64,
    /// Reads that issued a network fetch
    pub misses: u64,
    /// Reads that joined a fetch already in flight
    pub deduplicated: u64,
    /// Fetches that failed
    pub fetch_errors: u64,
    /// Entries removed by garbage collection
    pub gc_evictions: u64,
    /// Current number of entries in cache
    pub total_entries: usize,
    /// Share of reads that avoided a new fetch
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            deduplicated: stats.deduplicated,
            fetch_errors: stats.fetch_errors,
            gc_evictions: stats.gc_evictions,
            total_entries: stats.total_entries,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// One cache entry as listed by GET /queries
#[derive(Debug, Clone, Serialize)]
pub struct QuerySummary {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub has_data: bool,
    pub error: Option<String>,
    pub stale: bool,
    pub invalidated: bool,
    pub observers: usize,
    pub fetching: bool,
    /// Milliseconds since the last successful fetch
    pub age_ms: Option<u64>,
    pub stale_time_ms: u64,
    pub gc_time_ms: u64,
}

impl QuerySummary {
    pub fn from_entry(key: &QueryKey, entry: &CacheEntry, now: Instant) -> Self {
        let state = entry.state();
        Self {
            key: key.clone(),
            status: state.status,
            has_data: state.has_value(),
            error: state.error.as_ref().map(|e| e.to_string()),
            stale: entry.is_stale(now),
            invalidated: state.invalidated,
            observers: entry.subscriber_count(),
            fetching: entry.is_fetching(),
            age_ms: entry.age(now).map(|age| age.as_millis() as u64),
            stale_time_ms: entry.stale_time.as_millis() as u64,
            gc_time_ms: entry.gc_time.as_millis() as u64,
        }
    }
}

/// Response body for GET /queries
#[derive(Debug, Clone, Serialize)]
pub struct QueriesResponse {
    pub count: usize,
    pub queries: Vec<QuerySummary>,
}

impl QueriesResponse {
    /// Builds the listing, sorted by key for stable output.
    pub fn new(mut queries: Vec<QuerySummary>) -> Self {
        queries.sort_by_key(|q| q.key.to_string());
        Self {
            count: queries.len(),
            queries,
        }
    }
}

/// Response body for POST /queries/invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    pub invalidated: usize,
}

impl InvalidateResponse {
    pub fn new(key: &QueryKey, invalidated: usize) -> Self {
        Self {
            message: format!("Invalidated {} queries matching {}", invalidated, key),
            invalidated,
        }
    }
}

/// Response body for POST /queries/remove
#[derive(Debug, Clone, Serialize)]
pub struct RemoveResponse {
    pub message: String,
    pub key: QueryKey,
}

impl RemoveResponse {
    pub fn new(key: QueryKey) -> Self {
        Self {
            message: format!("Query {} removed", key),
            key,
        }
    }
}

/// Response body for DELETE /queries
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    pub message: String,
    pub removed: usize,
}

impl ClearResponse {
    pub fn new(removed: usize) -> Self {
        Self {
            message: format!("Cleared {} queries", removed),
            removed,
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
