//! Request DTOs for the devtools API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;

use crate::cache::{KeyPart, QueryKey};

/// Request body for POST /queries/invalidate
///
/// # Fields
/// - `key`: key parts, e.g. `["products", "category", "shoes"]`
/// - `exact`: when false (default) every key starting with `key` is invalidated
#[derive(Debug, Clone, Deserialize)]
pub struct InvalidateRequest {
    pub key: Vec<KeyPart>,
    #[serde(default)]
    pub exact: bool,
}

impl InvalidateRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.exact && self.key.is_empty() {
            return Some("Exact invalidation needs a non-empty key".to_string());
        }
        None
    }

    pub fn query_key(&self) -> QueryKey {
        QueryKey::new(self.key.iter().cloned())
    }
}

/// Request body for POST /queries/remove
#[derive(Debug, Clone, Deserialize)]
pub struct RemoveRequest {
    pub key: Vec<KeyPart>,
}

impl RemoveRequest {
    pub fn validate(&self) -> Option<String> {
        if self.key.is_empty() {
            return Some("Key cannot be empty".to_string());
        }
        None
    }

    pub fn query_key(&self) -> QueryKey {
        QueryKey::new(self.key.iter().cloned())
    }
}
