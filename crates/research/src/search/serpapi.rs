//! SerpApi search provider.
//!
//! Issues Google searches through `https://serpapi.com/search`. Each request
//! is billed as one search credit by SerpApi.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use viincci_core::{AppError, AppResult, SearchConfig};

use super::provider::{SearchError, SearchHit, SearchProvider};

/// Reported by SerpApi when a query simply has no hits.
const NO_RESULTS_MARKER: &str = "hasn't returned any results";

/// SerpApi-backed [`SearchProvider`].
pub struct SerpApiProvider {
    api_key: String,
    endpoint: String,
    engine: String,
    timeout_secs: u64,
    client: Client,
}

impl SerpApiProvider {
    /// Create a provider from the `search` config section and a resolved key.
    pub fn new(api_key: String, config: &SearchConfig) -> AppResult<Self> {
        if api_key.trim().is_empty() {
            return Err(AppError::Config("Search API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            endpoint: config.endpoint.clone(),
            engine: config.engine.clone(),
            timeout_secs: config.request_timeout_secs,
            client,
        })
    }
}

#[async_trait]
impl SearchProvider for SerpApiProvider {
    async fn search(
        &self,
        query: &str,
        num_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let num = num_results.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("api_key", self.api_key.as_str()),
                ("num", num.as_str()),
                ("engine", self.engine.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout {
                        timeout_secs: self.timeout_secs,
                    }
                } else {
                    // The request URL carries the API key
                    SearchError::Transport(e.without_url().to_string())
                }
            })?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SearchError::RateLimited);
        }

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SearchError::Unauthorized {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: SerpApiResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Parse(e.without_url().to_string()))?;

        let mut hits = body.into_hits()?;
        hits.truncate(num_results);
        tracing::debug!("SerpApi returned {} hits for '{}'", hits.len(), query);
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "serpapi"
    }
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrganicResult {
    link: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

impl SerpApiResponse {
    fn into_hits(self) -> Result<Vec<SearchHit>, SearchError> {
        if let Some(error) = self.error {
            if error.contains(NO_RESULTS_MARKER) {
                return Ok(Vec::new());
            }
            return Err(SearchError::Api {
                status: 200,
                message: error,
            });
        }

        Ok(self
            .organic_results
            .into_iter()
            .filter_map(|r| {
                r.link.map(|url| SearchHit {
                    title: r.title,
                    url,
                    snippet: r.snippet,
                })
            })
            .collect())
    }
}
