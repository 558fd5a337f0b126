//! Metered web search.

pub mod provider;
pub mod serpapi;

pub use provider::{SearchError, SearchHit, SearchProvider};
pub use serpapi::SerpApiProvider;
