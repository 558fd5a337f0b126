//! Embedding providers.
//!
//! Embeddings are produced behind the [`EmbeddingProvider`] trait so the RAG
//! engine never depends on a concrete model.

pub mod provider;
pub mod providers;

pub use provider::{create_provider, EmbeddingProvider};
pub use providers::{HashingProvider, OllamaProvider};
