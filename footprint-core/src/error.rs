//! Fetch error taxonomy
//!
//! Every adapter failure maps to one of these kinds. The crawl engine decides
//! retry and termination purely from the kind.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from fetching or extracting a single profile
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Network error: {0}")]
    TransientNetwork(String),

    #[error("Invalid input: {0}")]
    Invalid(String),
}

/// Serializable discriminant of a [`FetchError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AuthRequired,
    RateLimited,
    TransientNetwork,
    Invalid,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::NotFound(_) => ErrorKind::NotFound,
            FetchError::AuthRequired(_) => ErrorKind::AuthRequired,
            FetchError::RateLimited(_) => ErrorKind::RateLimited,
            FetchError::TransientNetwork(_) => ErrorKind::TransientNetwork,
            FetchError::Invalid(_) => ErrorKind::Invalid,
        }
    }

    /// Rate limits and network blips get exactly one more attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited(_) | FetchError::TransientNetwork(_)
        )
    }

    /// Map an HTTP status code to an error kind. Returns `None` for success codes.
    pub fn from_status(status: u16, url: &str) -> Option<Self> {
        match status {
            200..=299 | 304 => None,
            404 | 410 => Some(FetchError::NotFound(url.to_string())),
            401 | 403 => Some(FetchError::AuthRequired(format!("{} returned {}", url, status))),
            429 => Some(FetchError::RateLimited(url.to_string())),
            500..=599 => Some(FetchError::TransientNetwork(format!(
                "{} returned {}",
                url, status
            ))),
            _ => Some(FetchError::Invalid(format!("{} returned {}", url, status))),
        }
    }
}
