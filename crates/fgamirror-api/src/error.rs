//! Error types for the relationship store client.

use thiserror::Error;

/// Errors that can occur when talking to the relationship store.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed before a response was received.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configured API URL could not be parsed.
    #[error("invalid API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The store refused the request as invalid (e.g. the tuple does not
    /// exist, or fails model validation). Retrying will not help.
    #[error("request rejected ({status}): {code} - {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    /// Credentials missing or refused.
    #[error("unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// Rate limited.
    #[error("rate limited{}", match retry_after_secs {
        Some(secs) => format!(" (retry after {}s)", secs),
        None => String::new(),
    })]
    RateLimited { retry_after_secs: Option<u64> },

    /// Server-side or otherwise unexpected failure.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Operator input did not describe a tuple.
    #[error("invalid tuple '{0}': expected exactly three space-separated tokens")]
    InvalidTuple(String),
}

impl ApiError {
    /// Whether this is the "client error" status class: the store looked at
    /// the request and declared it invalid or not found.
    ///
    /// Auth failures and rate limiting are 4xx on the wire but are not a
    /// verdict on the tuple itself, so they are excluded.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ApiError::Rejected { .. })
    }

    /// HTTP status code, when the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Rejected { status, .. }
            | ApiError::Unauthorized { status, .. }
            | ApiError::Server { status, .. } => Some(*status),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
