//! Retrieval-augmented generation for viincci.
//!
//! Chunks gathered sources, embeds the chunks into an in-memory index and
//! answers questions from the most similar chunks with a generation model.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use viincci_core::{EmbeddingConfig, LlmConfig, RagConfig};
//! use viincci_knowledge::{create_provider, GenerationParams, RagEngine};
//!
//! # async fn example(sources: Vec<viincci_core::Source>) -> viincci_core::AppResult<()> {
//! let embedder = create_provider(&EmbeddingConfig::default()).await?;
//! let generator = viincci_llm::create_client(&LlmConfig::default())?;
//! let engine = RagEngine::new(RagConfig::default(), embedder, generator, "llama3.2");
//!
//! engine.build_index(&sources).await?;
//! let answer = engine
//!     .query("How do ferns reproduce?", 5, GenerationParams::default())
//!     .await?;
//! println!("{}", answer.text);
//! # Ok(())
//! # }
//! ```

pub mod chunker;
pub mod embeddings;
pub mod index;
pub mod rag;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingProvider, HashingProvider, OllamaProvider};
pub use index::MemoryIndex;
pub use rag::RagEngine;
pub use types::{
    Answer, BuildReport, Chunk, ChunkSpan, EmbeddingSignature, GenerationParams, IndexPhase,
    RagStats, RetrievedChunk, SourceFailure,
};
