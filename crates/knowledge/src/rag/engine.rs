//! RAG engine: build an index from sources, retrieve, generate.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use viincci_core::{AppError, AppResult, RagConfig, Source};
use viincci_llm::{LlmClient, LlmRequest};

use crate::chunker;
use crate::embeddings::EmbeddingProvider;
use crate::index::MemoryIndex;
use crate::rag::prompt::{self, SYSTEM_PROMPT};
use crate::types::{
    Answer, BuildReport, Chunk, GenerationParams, IndexPhase, RagStats, RetrievedChunk,
    SourceFailure,
};

/// Write access to the index for the duration of one build.
///
/// Publishes `Indexing` when taken and the settled phase when dropped, so an
/// aborted build never leaves the phase stuck at `Indexing`.
struct BuildGuard<'a> {
    index: RwLockWriteGuard<'a, MemoryIndex>,
    phase: &'a watch::Sender<IndexPhase>,
}

impl<'a> BuildGuard<'a> {
    fn begin(
        index: RwLockWriteGuard<'a, MemoryIndex>,
        phase: &'a watch::Sender<IndexPhase>,
    ) -> Self {
        phase.send_replace(IndexPhase::Indexing);
        Self { index, phase }
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        let settled = if self.index.is_empty() {
            IndexPhase::Empty
        } else {
            IndexPhase::Ready
        };
        self.phase.send_replace(settled);
    }
}

/// Retrieval-augmented generation over gathered sources.
///
/// One build runs at a time and holds the index write guard for its whole
/// duration, so queries only ever see a complete index.
pub struct RagEngine {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn LlmClient>,
    model: String,
    index: RwLock<MemoryIndex>,
    build_lock: Mutex<()>,
    phase: watch::Sender<IndexPhase>,
}

impl RagEngine {
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn LlmClient>,
        model: impl Into<String>,
    ) -> Self {
        let (phase, _) = watch::channel(IndexPhase::Empty);
        Self {
            config,
            embedder,
            generator,
            model: model.into(),
            index: RwLock::new(MemoryIndex::new()),
            build_lock: Mutex::new(()),
            phase,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Current phase of the index.
    pub fn phase(&self) -> IndexPhase {
        *self.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn subscribe(&self) -> watch::Receiver<IndexPhase> {
        self.phase.subscribe()
    }

    /// Chunk, embed and index `sources`.
    ///
    /// Chunks already present are skipped, so rebuilding from the same
    /// sources leaves the index unchanged. A source that fails is recorded
    /// in the report and does not affect the others.
    #[instrument(skip(self, sources), fields(source_count = sources.len()))]
    pub async fn build_index(&self, sources: &[Source]) -> AppResult<BuildReport> {
        let _serial = self.build_lock.lock().await;
        let mut build = BuildGuard::begin(self.index.write().await, &self.phase);

        let mut report = BuildReport::default();
        for source in sources {
            match self.index_source(&mut *build.index, source).await {
                Ok((added, skipped)) => {
                    report.sources_indexed += 1;
                    report.chunks_added += added;
                    report.duplicates_skipped += skipped;
                }
                Err(e) => {
                    warn!("Failed to index {}: {}", source.url, e);
                    report.failures.push(SourceFailure {
                        source_url: source.url.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let empty = build.index.is_empty();
        drop(build);

        info!(
            "Indexed {} sources: {} chunks added, {} duplicates, {} failures",
            report.sources_indexed,
            report.chunks_added,
            report.duplicates_skipped,
            report.failures.len()
        );

        if !sources.is_empty() && report.failures.len() == sources.len() && empty {
            let reasons: Vec<String> = report
                .failures
                .iter()
                .map(|f| format!("{}: {}", f.source_url, f.reason))
                .collect();
            return Err(AppError::Index(format!(
                "No source could be indexed ({})",
                reasons.join("; ")
            )));
        }

        Ok(report)
    }

    /// Index one source. Returns (chunks added, duplicates skipped).
    async fn index_source(
        &self,
        index: &mut MemoryIndex,
        source: &Source,
    ) -> AppResult<(usize, usize)> {
        if source.raw_text.trim().is_empty() {
            return Err(AppError::Index("Source has no text".to_string()));
        }

        let signature = self.embedder.signature();
        index.check_signature(&signature)?;

        let drafts = chunker::chunk_source(source, &self.config);
        let total = drafts.len();

        let mut seen = HashSet::new();
        let fresh: Vec<_> = drafts
            .into_iter()
            .filter(|d| !index.contains(&d.id) && seen.insert(d.id.clone()))
            .collect();
        let skipped = total - fresh.len();

        if fresh.is_empty() {
            debug!("All {} chunks of {} already indexed", total, source.url);
            return Ok((0, skipped));
        }

        let texts: Vec<String> = fresh.iter().map(|d| d.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| AppError::Index(format!("Embedding failed: {}", e)))?;

        if embeddings.len() != fresh.len() {
            return Err(AppError::Index(format!(
                "Embedder returned {} vectors for {} chunks",
                embeddings.len(),
                fresh.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != signature.dimensions) {
            return Err(AppError::Index(format!(
                "Embedder returned {} dimensions, expected {}",
                bad.len(),
                signature.dimensions
            )));
        }

        let mut added = 0;
        for (draft, embedding) in fresh.into_iter().zip(embeddings) {
            let chunk = Chunk {
                id: draft.id,
                source_url: source.url.clone(),
                source_title: source.title.clone(),
                text: draft.text,
                embedding,
                position: draft.position,
                span: draft.span,
            };
            if index.insert(chunk, &signature)? {
                added += 1;
            }
        }

        Ok((added, skipped))
    }

    async fn read_index(&self) -> AppResult<RwLockReadGuard<'_, MemoryIndex>> {
        let index = if self.config.reject_while_indexing {
            self.index
                .try_read()
                .map_err(|_| AppError::NotReady("index is being built".to_string()))?
        } else {
            self.index.read().await
        };

        if index.is_empty() {
            return Err(AppError::NotReady(
                "index is empty; build it from sources first".to_string(),
            ));
        }
        Ok(index)
    }

    /// The `k` chunks most similar to `question`, highest first.
    #[instrument(skip(self, question))]
    pub async fn retrieve(&self, question: &str, k: usize) -> AppResult<Vec<RetrievedChunk>> {
        if k == 0 {
            return Err(AppError::Config("k must be greater than 0".to_string()));
        }
        if question.trim().is_empty() {
            return Err(AppError::Config("Question must not be empty".to_string()));
        }

        let index = self.read_index().await?;

        let signature = self.embedder.signature();
        if let Some(built_with) = index.signature() {
            if *built_with != signature {
                return Err(AppError::Generation(format!(
                    "Embedding mismatch: index was built with {}, query uses {}",
                    built_with, signature
                )));
            }
        }

        let query = self
            .embedder
            .embed(question)
            .await
            .map_err(|e| AppError::Generation(format!("Embedding failed: {}", e)))?;

        let hits = index.search(&query, k)?;
        debug!("Retrieved {} of {} chunks", hits.len(), index.len());

        Ok(hits
            .into_iter()
            .enumerate()
            .map(|(i, (chunk, score))| RetrievedChunk {
                chunk: chunk.clone(),
                score,
                rank: i + 1,
            })
            .collect())
    }

    /// Answer `question` from the indexed sources.
    pub async fn query(
        &self,
        question: &str,
        k: usize,
        params: GenerationParams,
    ) -> AppResult<Answer> {
        self.query_with_cancel(question, k, params, &CancellationToken::new())
            .await
    }

    /// Answer `question`, aborting before generation if `cancel` has fired.
    #[instrument(skip(self, question, cancel), fields(model = %self.model))]
    pub async fn query_with_cancel(
        &self,
        question: &str,
        k: usize,
        params: GenerationParams,
        cancel: &CancellationToken,
    ) -> AppResult<Answer> {
        let retrieved = self.retrieve(question, k).await?;
        let (context, citations) = prompt::build_context(&retrieved, self.config.max_context_chars);
        let user_prompt = prompt::render_prompt(question, &context)?;

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(
                "query cancelled before generation".to_string(),
            ));
        }

        let request = LlmRequest::new(user_prompt, &self.model)
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(params.max_new_tokens)
            .with_temperature(params.temperature);

        info!(
            "Generating answer from {} of {} retrieved chunks",
            citations.len(),
            retrieved.len()
        );

        let response = self.generator.complete(&request).await.map_err(|e| match e {
            AppError::Generation(message) => AppError::Generation(message),
            other => AppError::Generation(other.to_string()),
        })?;

        Ok(Answer {
            question: question.trim().to_string(),
            text: response.content,
            model: response.model,
            citations,
            retrieved: retrieved.len(),
        })
    }

    /// Index statistics. Waits for a running build to finish.
    pub async fn stats(&self) -> RagStats {
        let index = self.index.read().await;
        let signature = self.embedder.signature();
        RagStats {
            phase: self.phase(),
            chunks: index.len(),
            sources: index.source_count(),
            embedding_provider: signature.provider,
            embedding_model: signature.model,
            dimensions: signature.dimensions,
        }
    }
}

impl std::fmt::Debug for RagEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagEngine")
            .field("config", &self.config)
            .field("embedder", &self.embedder)
            .field("generator", &self.generator.provider_name())
            .field("model", &self.model)
            .field("phase", &self.phase())
            .finish()
    }
}
