//! Configuration Module
//!
//! Handles loading client configuration from environment variables.

use std::env;
use std::time::Duration;

use crate::error::Result;
use crate::query::QueryOptions;

/// Client configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the storefront API
    pub api_base_url: String,
    /// Base URL of the admin API
    pub admin_base_url: String,
    /// Options applied by query bindings that do not override them
    pub query_defaults: QueryOptions,
    /// Devtools HTTP server port
    pub devtools_port: u16,
    /// Background GC sweep interval in seconds
    pub cleanup_interval: u64,
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CATALOG_API_URL` - Storefront API base (default: http://localhost:8080/api)
    /// - `CATALOG_ADMIN_URL` - Admin API base (default: http://localhost:8080/admin)
    /// - `STALE_TIME_MS` - Default stale time in milliseconds (default: 300000)
    /// - `GC_TIME_MS` - Default gc time in milliseconds (default: 600000)
    /// - `QUERY_DEFAULTS` - JSON option bag applied on top of the two above
    /// - `DEVTOOLS_PORT` - Devtools HTTP port (default: 3000)
    /// - `CLEANUP_INTERVAL` - GC sweep frequency in seconds (default: 30)
    ///
    /// A malformed `QUERY_DEFAULTS` bag is rejected rather than ignored.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let mut query_defaults = defaults.query_defaults;
        if let Some(ms) = parsed::<u64>("STALE_TIME_MS") {
            query_defaults.stale_time = Duration::from_millis(ms);
        }
        if let Some(ms) = parsed::<u64>("GC_TIME_MS") {
            query_defaults.gc_time = Duration::from_millis(ms);
        }
        if let Ok(bag) = env::var("QUERY_DEFAULTS") {
            query_defaults = query_defaults.merge_json(&bag)?;
        }

        Ok(Self {
            api_base_url: env::var("CATALOG_API_URL").unwrap_or(defaults.api_base_url),
            admin_base_url: env::var("CATALOG_ADMIN_URL").unwrap_or(defaults.admin_base_url),
            query_defaults,
            devtools_port: parsed("DEVTOOLS_PORT").unwrap_or(defaults.devtools_port),
            cleanup_interval: parsed("CLEANUP_INTERVAL").unwrap_or(defaults.cleanup_interval),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api".to_string(),
            admin_base_url: "http://localhost:8080/admin".to_string(),
            query_defaults: QueryOptions::default(),
            devtools_port: 3000,
            cleanup_interval: 30,
        }
    }
}
