//! Generation provider factory.
//!
//! Resolves the configured provider into a concrete [`LlmClient`] at startup,
//! so an unknown or misconfigured provider is a configuration error before
//! any research runs.

use std::sync::Arc;
use std::time::Duration;

use crate::client::LlmClient;
use crate::providers::OllamaClient;
use viincci_core::{AppError, AppResult, LlmConfig};

/// Create a generation client from the `llm` config section.
///
/// # Errors
/// Returns `AppError::Config` if the provider is unknown or the HTTP client
/// cannot be built.
pub fn create_client(config: &LlmConfig) -> AppResult<Arc<dyn LlmClient>> {
    match config.provider.to_lowercase().as_str() {
        "ollama" => {
            let client =
                OllamaClient::new(&config.endpoint, Duration::from_secs(config.timeout_secs))?;
            Ok(Arc::new(client))
        }
        other => Err(AppError::Config(format!(
            "Unknown LLM provider: {}. Supported: ollama",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_ollama_client() {
        let client = create_client(&LlmConfig::default()).unwrap();
        assert_eq!(client.provider_name(), "ollama");
    }

    #[test]
    fn test_provider_name_is_case_insensitive() {
        let config = LlmConfig {
            provider: "Ollama".to_string(),
            ..LlmConfig::default()
        };
        assert!(create_client(&config).is_ok());
    }

    #[test]
    fn test_unknown_provider() {
        let config = LlmConfig {
            provider: "gguf".to_string(),
            ..LlmConfig::default()
        };
        match create_client(&config) {
            Err(AppError::Config(msg)) => assert!(msg.contains("Unknown LLM provider")),
            _ => panic!("Expected config error for unknown provider"),
        }
    }
}
