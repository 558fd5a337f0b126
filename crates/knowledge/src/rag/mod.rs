//! Retrieval-augmented generation over an in-memory index.

pub mod engine;
pub mod prompt;

pub use engine::RagEngine;
