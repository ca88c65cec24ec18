//! Error types for the query cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Query Error Enum ==
/// Unified error type for fetches, bindings and the devtools API.
///
/// Cloneable so a single fetch outcome can be handed to every waiter that
/// joined the same in-flight request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Fetch rejected: non-2xx response or connectivity failure
    #[error("Network error: {message}")]
    Network {
        /// HTTP status, when a response was received
        status: Option<u16>,
        /// Human-readable description
        message: String,
    },

    /// Response payload could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Programming error on the consumer side
    #[error("Misuse: {0}")]
    Misuse(String),

    /// Requested cache entry does not exist
    #[error("Query not found: {0}")]
    NotFound(String),

    /// The task driving a fetch did not complete
    #[error("Fetch aborted: {0}")]
    Aborted(String),
}

impl QueryError {
    /// Creates a network error without an HTTP status.
    pub fn network(message: impl Into<String>) -> Self {
        QueryError::Network {
            status: None,
            message: message.into(),
        }
    }

    /// Creates a network error for a non-success HTTP status.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        QueryError::Network {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Returns true for failures worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueryError::Network { status: None, .. } => true,
            QueryError::Network {
                status: Some(code), ..
            } => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for QueryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            QueryError::Decode(err.to_string())
        } else {
            QueryError::Network {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            }
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::NotFound(_) => StatusCode::NOT_FOUND,
            QueryError::Misuse(_) => StatusCode::BAD_REQUEST,
            QueryError::Network { .. } | QueryError::Decode(_) => StatusCode::BAD_GATEWAY,
            QueryError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the query cache.
pub type Result<T> = std::result::Result<T, QueryError>;
