//! Query Options Module
//!
//! The configuration surface of a query binding: freshness window, idle
//! eviction delay and the enabled switch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, Result};

/// Default freshness window (5 minutes).
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// Default idle time before eviction (10 minutes).
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(10 * 60);

// == Query Options ==
/// Options recognised by a query binding.
///
/// Deserializes from an option bag such as
/// `{"stale_time_ms": 1000, "gc_time_ms": 60000, "enabled": true}`; missing
/// fields take their defaults and unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QueryOptions {
    /// Time after a successful fetch during which reads are served from cache
    #[serde(rename = "stale_time_ms", with = "millis")]
    pub stale_time: Duration,
    /// Idle time after the last observer leaves before the entry is evicted
    #[serde(rename = "gc_time_ms", with = "millis")]
    pub gc_time: Duration,
    /// When false no entry is touched and no fetch is issued
    pub enabled: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            gc_time: DEFAULT_GC_TIME,
            enabled: true,
        }
    }
}

impl QueryOptions {
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    pub fn gc_time(mut self, gc_time: Duration) -> Self {
        self.gc_time = gc_time;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    // == From Option Bag ==
    /// Parses a JSON option bag.
    ///
    /// Unknown keys or mistyped values are a [`QueryError::Misuse`].
    pub fn from_json(bag: &str) -> Result<Self> {
        serde_json::from_str(bag)
            .map_err(|e| QueryError::Misuse(format!("invalid query options: {}", e)))
    }

    /// Overlays a JSON option bag on these options.
    ///
    /// Fields absent from the bag keep their current value.
    pub fn merge_json(&self, bag: &str) -> Result<Self> {
        let invalid = |e: serde_json::Error| QueryError::Misuse(format!("invalid query options: {}", e));

        let overrides: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(bag).map_err(invalid)?;
        let mut merged = match serde_json::to_value(self).map_err(invalid)? {
            serde_json::Value::Object(fields) => fields,
            _ => serde_json::Map::new(),
        };
        merged.extend(overrides);
        serde_json::from_value(serde_json::Value::Object(merged)).map_err(invalid)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
