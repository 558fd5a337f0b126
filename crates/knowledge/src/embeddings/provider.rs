//! Embedding provider trait and factory.

use std::sync::Arc;

use viincci_core::{AppError, AppResult, EmbeddingConfig};

use crate::types::EmbeddingSignature;

/// Trait for embedding providers.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Provider name (e.g., "hashing", "ollama")
    fn provider_name(&self) -> &str;

    /// Model identifier
    fn model_name(&self) -> &str;

    /// Embedding dimensions
    fn dimensions(&self) -> usize;

    /// Generate embeddings for multiple texts, one vector per input in order.
    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>>;

    /// Generate embedding for a single text.
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results
            .pop()
            .ok_or_else(|| AppError::Generation("No embedding returned".to_string()))
    }

    /// Identity of the vector space this provider produces.
    fn signature(&self) -> EmbeddingSignature {
        EmbeddingSignature {
            provider: self.provider_name().to_string(),
            model: self.model_name().to_string(),
            dimensions: self.dimensions(),
        }
    }
}

/// Create an embedding provider based on configuration.
///
/// The Ollama provider verifies the server and model before returning.
pub async fn create_provider(config: &EmbeddingConfig) -> AppResult<Arc<dyn EmbeddingProvider>> {
    if config.dimensions == 0 {
        return Err(AppError::Config(
            "Embedding dimensions must be greater than 0".to_string(),
        ));
    }

    tracing::debug!(
        "Creating embedding provider: provider={}, model={}, dimensions={}",
        config.provider,
        config.model,
        config.dimensions
    );

    match config.provider.to_lowercase().as_str() {
        "hashing" => Ok(Arc::new(super::HashingProvider::new(
            &config.model,
            config.dimensions,
        ))),

        "ollama" => {
            let endpoint = config
                .endpoint
                .as_deref()
                .unwrap_or(super::providers::ollama::DEFAULT_ENDPOINT);
            let provider =
                super::OllamaProvider::connect(endpoint, &config.model, config.dimensions).await?;
            Ok(Arc::new(provider))
        }

        _ => Err(AppError::Config(format!(
            "Unknown embedding provider: '{}'. Supported providers: hashing, ollama",
            config.provider
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_hashing_provider() {
        let provider = create_provider(&EmbeddingConfig::default()).await.unwrap();
        assert_eq!(provider.provider_name(), "hashing");
        assert_eq!(provider.model_name(), "trigram-v1");
        assert_eq!(provider.dimensions(), 384);

        let signature = provider.signature();
        assert_eq!(signature.dimensions, 384);
        assert_eq!(signature.to_string(), "hashing/trigram-v1 (384 dims)");
    }

    #[tokio::test]
    async fn test_create_unknown_provider() {
        let config = EmbeddingConfig {
            provider: "word2vec".to_string(),
            ..Default::default()
        };

        let err = create_provider(&config).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[tokio::test]
    async fn test_zero_dimensions_rejected() {
        let config = EmbeddingConfig {
            dimensions: 0,
            ..Default::default()
        };
        assert!(matches!(
            create_provider(&config).await,
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_embed_single() {
        let provider = create_provider(&EmbeddingConfig::default()).await.unwrap();
        let embedding = provider.embed("fern spores").await.unwrap();
        assert_eq!(embedding.len(), 384);
    }
}
