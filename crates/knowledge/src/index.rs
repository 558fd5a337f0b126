//! In-memory vector index.
//!
//! Chunks are kept in insertion order with L2-normalized embeddings, so
//! cosine similarity is a dot product. Search is exact.

use std::collections::{HashMap, HashSet};

use viincci_core::{AppError, AppResult};

use crate::types::{Chunk, EmbeddingSignature};

/// Cosine similarity of two vectors, clamped to [-1, 1].
///
/// Zero vectors score 0 against everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Scale a vector to unit length in place. Zero vectors are left as is.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Exact nearest-neighbour index over chunk embeddings.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    chunks: Vec<Chunk>,
    ids: HashSet<String>,
    source_chunks: HashMap<String, usize>,
    signature: Option<EmbeddingSignature>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of distinct sources with at least one chunk.
    pub fn source_count(&self) -> usize {
        self.source_chunks.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Embedding space the index was built in, once it holds a chunk.
    pub fn signature(&self) -> Option<&EmbeddingSignature> {
        self.signature.as_ref()
    }

    /// Check that vectors from `signature` may be mixed with this index.
    pub fn check_signature(&self, signature: &EmbeddingSignature) -> AppResult<()> {
        match &self.signature {
            Some(existing) if existing != signature => Err(AppError::Index(format!(
                "Embedding mismatch: index was built with {}, got {}",
                existing, signature
            ))),
            _ => Ok(()),
        }
    }

    /// Insert a chunk. Returns `false` when a chunk with the same id exists.
    pub fn insert(&mut self, mut chunk: Chunk, signature: &EmbeddingSignature) -> AppResult<bool> {
        self.check_signature(signature)?;

        if chunk.embedding.len() != signature.dimensions {
            return Err(AppError::Index(format!(
                "Chunk {} has {} dimensions, expected {}",
                chunk.id,
                chunk.embedding.len(),
                signature.dimensions
            )));
        }

        if !self.ids.insert(chunk.id.clone()) {
            return Ok(false);
        }

        l2_normalize(&mut chunk.embedding);
        *self
            .source_chunks
            .entry(chunk.source_url.clone())
            .or_insert(0) += 1;
        if self.signature.is_none() {
            self.signature = Some(signature.clone());
        }
        self.chunks.push(chunk);
        Ok(true)
    }

    /// Top-k chunks by cosine similarity, highest first.
    ///
    /// Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], top_k: usize) -> AppResult<Vec<(&Chunk, f32)>> {
        if let Some(signature) = &self.signature {
            if query.len() != signature.dimensions {
                return Err(AppError::Generation(format!(
                    "Query embedding has {} dimensions, index expects {}",
                    query.len(),
                    signature.dimensions
                )));
            }
        }

        let mut scored: Vec<(&Chunk, f32)> = self
            .chunks
            .iter()
            .map(|chunk| (chunk, cosine_similarity(query, &chunk.embedding)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);
        Ok(scored)
    }
}
