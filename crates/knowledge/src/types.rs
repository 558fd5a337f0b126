//! RAG engine type definitions.

use serde::{Deserialize, Serialize};

/// Byte span of a chunk within its source text.
///
/// `text[fresh_start..end]` is the part not shared with the previous chunk;
/// concatenating those slices over all chunks of a source reproduces the
/// source text exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkSpan {
    pub start: usize,
    pub end: usize,
    pub fresh_start: usize,
}

/// The unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    /// SHA-256 of the normalized text and source URL
    pub id: String,

    /// Back-reference to the source (not ownership)
    pub source_url: String,

    /// Title of the source, used in citations
    pub source_title: String,

    /// Chunk text
    pub text: String,

    /// L2-normalized embedding
    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,

    /// Position of the chunk within its source
    pub position: usize,

    /// Byte span within the source text
    pub span: ChunkSpan,
}

impl Chunk {
    /// Title when present, otherwise the source URL.
    pub fn source_label(&self) -> &str {
        if self.source_title.trim().is_empty() {
            &self.source_url
        } else {
            &self.source_title
        }
    }
}

/// A chunk returned by retrieval.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub chunk: Chunk,

    /// Cosine similarity in [-1, 1]
    pub score: f32,

    /// 1-based rank, highest similarity first
    pub rank: usize,
}

/// Identity of the embedding space an index was built in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddingSignature {
    pub provider: String,
    pub model: String,
    pub dimensions: usize,
}

impl std::fmt::Display for EmbeddingSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} ({} dims)", self.provider, self.model, self.dimensions)
    }
}

/// Lifecycle of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexPhase {
    Empty,
    Indexing,
    Ready,
}

impl std::fmt::Display for IndexPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "EMPTY"),
            Self::Indexing => write!(f, "INDEXING"),
            Self::Ready => write!(f, "READY"),
        }
    }
}

/// A source that could not be indexed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceFailure {
    pub source_url: String,
    pub reason: String,
}

/// Summary of one `build_index` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildReport {
    pub sources_indexed: usize,
    pub chunks_added: usize,
    pub duplicates_skipped: usize,
    pub failures: Vec<SourceFailure>,
}

/// Sampling parameters of the generation call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub max_new_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 2000,
            temperature: 0.7,
        }
    }
}

/// A generated answer with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub question: String,
    pub text: String,
    pub model: String,

    /// Chunks actually placed in the prompt, in rank order
    pub citations: Vec<RetrievedChunk>,

    /// Chunks returned by retrieval before the context bound was applied
    pub retrieved: usize,
}

/// Index statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagStats {
    pub phase: IndexPhase,
    pub chunks: usize,
    pub sources: usize,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub dimensions: usize,
}
