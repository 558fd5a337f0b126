//! Search provider capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::Retryable;

/// A single organic search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Title of the result
    pub title: String,
    /// Result URL as returned by the provider
    pub url: String,
    /// Snippet/description of the result
    pub snippet: String,
}

/// Errors that can occur during a metered search.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SearchError {
    /// Rate limited by the provider
    #[error("Rate limited by search provider")]
    RateLimited,

    /// Credentials rejected
    #[error("Search API key rejected ({status})")]
    Unauthorized { status: u16 },

    /// Non-success HTTP status or provider-reported error
    #[error("Search API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Request timed out
    #[error("Search timeout after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Connection-level failure
    #[error("Search transport error: {0}")]
    Transport(String),

    /// Response body could not be decoded
    #[error("Invalid search response: {0}")]
    Parse(String),
}

impl Retryable for SearchError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Timeout { .. } | Self::Transport(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Unauthorized { .. } | Self::Parse(_) => false,
        }
    }
}

/// Capability: metered web search.
///
/// Every call costs credits; callers must obtain an authorization from the
/// credit governor before invoking [`SearchProvider::search`].
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Perform a web search returning at most `num_results` hits.
    async fn search(&self, query: &str, num_results: usize)
        -> Result<Vec<SearchHit>, SearchError>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SearchError::RateLimited.is_retryable());
        assert!(SearchError::Timeout { timeout_secs: 40 }.is_retryable());
        assert!(SearchError::Api {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!SearchError::Api {
            status: 400,
            message: String::new()
        }
        .is_retryable());
        assert!(!SearchError::Unauthorized { status: 401 }.is_retryable());
    }
}
