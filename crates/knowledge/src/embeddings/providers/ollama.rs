//! Ollama embedding provider.
//!
//! Calls `/api/embeddings` on a local Ollama server, one request per text,
//! with exponential backoff between attempts.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use viincci_core::{AppError, AppResult};

use crate::embeddings::provider::EmbeddingProvider;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const EMBEDDING_PATH: &str = "/api/embeddings";

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 100;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Ollama embedding provider.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaProvider {
    /// Build the provider without contacting the server.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                AppError::Generation(format!("Failed to create HTTP client for Ollama: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimensions,
        })
    }

    /// Build the provider and verify that the model answers with the
    /// configured dimensions.
    pub async fn connect(
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> AppResult<Self> {
        let provider = Self::new(base_url, model, dimensions)?;
        provider.verify_connection().await?;
        Ok(provider)
    }

    #[instrument(skip(self), fields(model = %self.model))]
    async fn verify_connection(&self) -> AppResult<()> {
        debug!("Verifying Ollama connection at {}", self.base_url);

        self.embed_single("connection check").await.map_err(|e| {
            AppError::Generation(format!(
                "Ollama not available at {} ({}). Ensure Ollama is running and run: ollama pull {}",
                self.base_url, e, self.model
            ))
        })?;

        debug!("Ollama embedding model '{}' ready", self.model);
        Ok(())
    }

    async fn embed_with_retries(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.embed_single(text).await {
                Ok(embedding) => return Ok(embedding),
                Err(e) if attempt >= MAX_ATTEMPTS => return Err(e),
                Err(e) => {
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                    warn!(
                        "Embedding failed (attempt {}/{}): {}; retrying in {}ms",
                        attempt, MAX_ATTEMPTS, e, backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }

    async fn embed_single(&self, text: &str) -> AppResult<Vec<f32>> {
        let url = format!("{}{}", self.base_url, EMBEDDING_PATH);
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Generation(format!("Failed to send request to Ollama: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(AppError::Generation(format!(
                "Ollama API error ({}): {}",
                status, message
            )));
        }

        let body: EmbeddingResponse = response.json().await.map_err(|e| {
            AppError::Generation(format!("Failed to parse Ollama response: {}", e))
        })?;

        if body.embedding.len() != self.dimensions {
            return Err(AppError::Generation(format!(
                "Ollama model '{}' returned {} dimensions, expected {}",
                self.model,
                body.embedding.len(),
                self.dimensions
            )));
        }

        Ok(body.embedding)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn provider_name(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[instrument(skip(self, texts), fields(batch_size = texts.len(), model = %self.model))]
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());

        // No batch endpoint; embed sequentially
        for text in texts {
            if text.trim().is_empty() {
                embeddings.push(vec![0.0; self.dimensions]);
                continue;
            }
            embeddings.push(self.embed_with_retries(text).await?);
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_trims_trailing_slash() {
        let provider = OllamaProvider::new("http://localhost:11434/", "nomic-embed-text", 768)
            .unwrap();
        assert_eq!(provider.base_url, "http://localhost:11434");
        assert_eq!(provider.provider_name(), "ollama");
        assert_eq!(provider.dimensions(), 768);
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let provider = OllamaProvider::new("http://127.0.0.1:9", "nomic-embed-text", 8).unwrap();
        assert!(provider.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_whitespace_text_is_zero_vector() {
        let provider = OllamaProvider::new("http://127.0.0.1:9", "nomic-embed-text", 8).unwrap();
        let batch = provider.embed_batch(&["   ".to_string()]).await.unwrap();
        assert_eq!(batch, vec![vec![0.0; 8]]);
    }
}
