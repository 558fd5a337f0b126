//! End-to-end behaviour of the RAG engine with fake embedders and models.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use viincci_core::{AppError, AppResult, RagConfig, Source};
use viincci_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};

use crate::chunker;
use crate::embeddings::{EmbeddingProvider, HashingProvider};
use crate::rag::RagEngine;
use crate::types::{GenerationParams, IndexPhase};

const FERN_TEXT: &str = "Ferns are vascular plants that reproduce via spores. \
    The spores form in sori on the underside of the fronds. \
    Ferns have neither seeds nor flowers.";

const ENGINE_TEXT: &str = "Diesel engines compress air until it is hot. \
    Fuel injected into the hot air ignites without a spark plug.";

#[derive(Default)]
struct FakeLlm {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    fail: bool,
}

impl FakeLlm {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_prompt(&self) -> String {
        self.prompts
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl LlmClient for FakeLlm {
    fn provider_name(&self) -> &str {
        "fake"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if self.fail {
            return Err(AppError::Generation("model offline".to_string()));
        }
        Ok(LlmResponse {
            content: "Ferns reproduce with spores [Source 1].".to_string(),
            model: request.model.clone(),
            usage: LlmUsage::new(10, 8),
        })
    }
}

/// Holds the next batch after `arm` until the returned sender fires.
#[derive(Debug)]
struct GatedEmbedder {
    inner: HashingProvider,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl GatedEmbedder {
    fn new() -> Self {
        Self {
            inner: HashingProvider::new("trigram-v1", 128),
            gate: Mutex::new(None),
        }
    }

    fn arm(&self) -> oneshot::Sender<()> {
        let (release, gate) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(gate);
        release
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for GatedEmbedder {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.embed_batch(texts).await
    }
}

/// Fails any batch containing the word "poison".
#[derive(Debug)]
struct PoisonEmbedder {
    inner: HashingProvider,
}

#[async_trait::async_trait]
impl EmbeddingProvider for PoisonEmbedder {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.contains("poison")) {
            return Err(AppError::Generation("embedding model crashed".to_string()));
        }
        self.inner.embed_batch(texts).await
    }
}

fn source(url: &str, title: &str, text: &str) -> Source {
    Source {
        url: url.to_string(),
        title: title.to_string(),
        raw_text: text.to_string(),
        source_type: "web".to_string(),
        reliability_score: 0.5,
        trusted: false,
        fetched_at: Utc::now(),
        query: "ferns".to_string(),
    }
}

fn sources() -> Vec<Source> {
    vec![
        source("https://plants.example.org/ferns", "Ferns", FERN_TEXT),
        source("https://cars.example.org/diesel", "Diesel engines", ENGINE_TEXT),
    ]
}

fn hashing() -> Arc<dyn EmbeddingProvider> {
    Arc::new(HashingProvider::new("trigram-v1", 256))
}

fn small_chunks() -> RagConfig {
    RagConfig {
        chunk_size: 100,
        chunk_overlap: 20,
        boundary_lookback: 20,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_build_then_query_cites_sources() {
    let llm = Arc::new(FakeLlm::default());
    let engine = RagEngine::new(small_chunks(), hashing(), llm.clone(), "llama3.2");

    let report = engine.build_index(&sources()).await.unwrap();
    assert_eq!(report.sources_indexed, 2);
    assert!(report.chunks_added >= 2);
    assert!(report.failures.is_empty());
    assert_eq!(engine.phase(), IndexPhase::Ready);

    let answer = engine
        .query(
            "How do ferns reproduce with spores?",
            2,
            GenerationParams::default(),
        )
        .await
        .unwrap();

    assert_eq!(answer.model, "llama3.2");
    assert_eq!(answer.retrieved, 2);
    assert_eq!(
        answer.citations[0].chunk.source_url,
        "https://plants.example.org/ferns"
    );
    assert_eq!(llm.calls(), 1);

    let prompt = llm.last_prompt();
    assert!(prompt.contains("[Source 1: Ferns]"));
    assert!(prompt.contains("Question: How do ferns reproduce with spores?"));
}

#[tokio::test]
async fn test_rebuild_from_same_sources_is_idempotent() {
    let engine = RagEngine::new(
        small_chunks(),
        hashing(),
        Arc::new(FakeLlm::default()),
        "llama3.2",
    );

    let first = engine.build_index(&sources()).await.unwrap();
    let before = engine.stats().await;

    let second = engine.build_index(&sources()).await.unwrap();
    let after = engine.stats().await;

    assert_eq!(second.chunks_added, 0);
    assert_eq!(second.duplicates_skipped, first.chunks_added);
    assert_eq!(before.chunks, after.chunks);
    assert_eq!(after.sources, 2);
}

#[tokio::test]
async fn test_chunks_cover_source_text_exactly_once() {
    let text = "Ferns are vascular plants that reproduce via spores. ".repeat(6)[..300].to_string();
    assert_eq!(text.len(), 300);

    let engine = RagEngine::new(
        small_chunks(),
        hashing(),
        Arc::new(FakeLlm::default()),
        "llama3.2",
    );
    let report = engine
        .build_index(&[source("https://plants.example.org/ferns", "Ferns", &text)])
        .await
        .unwrap();

    let spans = chunker::split_spans(&text, 100, 20, 20);
    assert!(spans.len() >= 3);
    assert_eq!(report.chunks_added + report.duplicates_skipped, spans.len());

    let mut retrieved = engine.retrieve("fern spores", 100).await.unwrap();
    retrieved.sort_by_key(|r| r.chunk.position);

    let mut covered = String::new();
    for r in &retrieved {
        assert!(r.chunk.span.end - r.chunk.span.start <= 100);
        assert_eq!(&text[r.chunk.span.start..r.chunk.span.end], r.chunk.text);
        covered.push_str(&text[r.chunk.span.fresh_start..r.chunk.span.end]);
    }
    assert_eq!(covered, text);
}

#[tokio::test]
async fn test_query_before_build_is_not_ready() {
    let llm = Arc::new(FakeLlm::default());
    let engine = RagEngine::new(RagConfig::default(), hashing(), llm.clone(), "llama3.2");

    assert_eq!(engine.phase(), IndexPhase::Empty);
    let err = engine
        .query("anything", 3, GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotReady(_)));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_single_chunk_retrieved_with_bounded_score() {
    let engine = RagEngine::new(
        RagConfig::default(),
        hashing(),
        Arc::new(FakeLlm::default()),
        "llama3.2",
    );
    engine
        .build_index(&[source("https://a.example.org", "", "Oak is a hardwood.")])
        .await
        .unwrap();

    let retrieved = engine.retrieve("completely unrelated words", 5).await.unwrap();
    assert_eq!(retrieved.len(), 1);
    assert_eq!(retrieved[0].rank, 1);
    assert!((-1.0..=1.0).contains(&retrieved[0].score));
}

#[tokio::test]
async fn test_zero_k_is_config_error() {
    let engine = RagEngine::new(
        RagConfig::default(),
        hashing(),
        Arc::new(FakeLlm::default()),
        "llama3.2",
    );
    engine.build_index(&sources()).await.unwrap();

    assert!(matches!(
        engine.retrieve("ferns", 0).await,
        Err(AppError::Config(_))
    ));
}

#[tokio::test]
async fn test_generation_failure_is_surfaced_once() {
    let llm = Arc::new(FakeLlm::failing());
    let engine = RagEngine::new(RagConfig::default(), hashing(), llm.clone(), "llama3.2");
    engine.build_index(&sources()).await.unwrap();

    let err = engine
        .query("ferns", 3, GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Generation(_)));
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_cancelled_query_skips_generation() {
    let llm = Arc::new(FakeLlm::default());
    let engine = RagEngine::new(RagConfig::default(), hashing(), llm.clone(), "llama3.2");
    engine.build_index(&sources()).await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine
        .query_with_cancel("ferns", 3, GenerationParams::default(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Cancelled(_)));
    assert_eq!(llm.calls(), 0);
}

#[tokio::test]
async fn test_context_bound_limits_citations() {
    let llm = Arc::new(FakeLlm::default());
    let config = RagConfig {
        max_context_chars: 120,
        ..small_chunks()
    };
    let engine = RagEngine::new(config, hashing(), llm.clone(), "llama3.2");
    engine.build_index(&sources()).await.unwrap();

    let answer = engine
        .query("ferns spores fronds", 4, GenerationParams::default())
        .await
        .unwrap();
    assert_eq!(answer.retrieved, 4);
    assert!(!answer.citations.is_empty());
    assert!(answer.citations.len() < answer.retrieved);
}

#[tokio::test]
async fn test_build_fails_when_every_source_is_empty() {
    let engine = RagEngine::new(
        RagConfig::default(),
        hashing(),
        Arc::new(FakeLlm::default()),
        "llama3.2",
    );

    let err = engine
        .build_index(&[
            source("https://a.example.org", "A", ""),
            source("https://b.example.org", "B", "   \n "),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Index(_)));
    assert_eq!(engine.phase(), IndexPhase::Empty);
}

#[tokio::test]
async fn test_failed_source_does_not_abort_build() {
    let engine = RagEngine::new(
        RagConfig::default(),
        Arc::new(PoisonEmbedder {
            inner: HashingProvider::new("trigram-v1", 128),
        }),
        Arc::new(FakeLlm::default()),
        "llama3.2",
    );

    let report = engine
        .build_index(&[
            source("https://a.example.org", "A", "This page is poison to embedders."),
            source("https://b.example.org", "B", ""),
            source("https://c.example.org", "C", FERN_TEXT),
        ])
        .await
        .unwrap();

    assert_eq!(report.sources_indexed, 1);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.failures[0].source_url, "https://a.example.org");
    assert!(report.failures[0].reason.contains("Index error"));
    assert_eq!(engine.phase(), IndexPhase::Ready);
}

#[tokio::test]
async fn test_query_waits_for_running_build() {
    let embedder = Arc::new(GatedEmbedder::new());
    let release = embedder.arm();
    let llm = Arc::new(FakeLlm::default());
    let engine = Arc::new(RagEngine::new(
        small_chunks(),
        embedder,
        llm.clone(),
        "llama3.2",
    ));
    let mut phase = engine.subscribe();

    let builder = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.build_index(&sources()).await })
    };
    phase
        .wait_for(|p| *p == IndexPhase::Indexing)
        .await
        .unwrap();

    let query = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .query("fern spores", 50, GenerationParams::default())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!query.is_finished());
    assert_eq!(llm.calls(), 0);

    release.send(()).unwrap();
    let report = builder.await.unwrap().unwrap();
    let answer = query.await.unwrap().unwrap();

    // The query saw the complete index, never a partial one
    assert_eq!(answer.retrieved, report.chunks_added);
    assert_eq!(engine.phase(), IndexPhase::Ready);
}

#[tokio::test]
async fn test_query_rejected_while_indexing() {
    let embedder = Arc::new(GatedEmbedder::new());
    let release = embedder.arm();
    let config = RagConfig {
        reject_while_indexing: true,
        ..small_chunks()
    };
    let engine = Arc::new(RagEngine::new(
        config,
        embedder,
        Arc::new(FakeLlm::default()),
        "llama3.2",
    ));
    let mut phase = engine.subscribe();

    let builder = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.build_index(&sources()).await })
    };
    phase
        .wait_for(|p| *p == IndexPhase::Indexing)
        .await
        .unwrap();

    let err = engine
        .query("fern spores", 3, GenerationParams::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotReady(_)));

    release.send(()).unwrap();
    builder.await.unwrap().unwrap();

    let answer = engine
        .query("fern spores", 3, GenerationParams::default())
        .await
        .unwrap();
    assert_eq!(answer.retrieved, 3);
}

#[tokio::test]
async fn test_query_waits_for_incremental_build_on_ready_index() {
    let embedder = Arc::new(GatedEmbedder::new());
    let engine = Arc::new(RagEngine::new(
        small_chunks(),
        embedder.clone(),
        Arc::new(FakeLlm::default()),
        "llama3.2",
    ));
    let first = engine.build_index(&sources()).await.unwrap();
    assert_eq!(engine.phase(), IndexPhase::Ready);

    let mut phase = engine.subscribe();
    let release = embedder.arm();
    let builder = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .build_index(&[source(
                    "https://trees.example.org/oak",
                    "Oak",
                    "Oaks are hardwood trees. Their fruit is the acorn.",
                )])
                .await
        })
    };
    phase
        .wait_for(|p| *p == IndexPhase::Indexing)
        .await
        .unwrap();

    let query = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .query("oak acorn", 50, GenerationParams::default())
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!query.is_finished());

    release.send(()).unwrap();
    let second = builder.await.unwrap().unwrap();
    let answer = query.await.unwrap().unwrap();

    assert!(second.chunks_added > 0);
    assert_eq!(answer.retrieved, first.chunks_added + second.chunks_added);
    assert_eq!(engine.phase(), IndexPhase::Ready);
    assert_eq!(engine.stats().await.sources, 3);
}

#[tokio::test]
async fn test_aborted_build_settles_phase() {
    let embedder = Arc::new(GatedEmbedder::new());
    let _release = embedder.arm();
    let engine = Arc::new(RagEngine::new(
        small_chunks(),
        embedder,
        Arc::new(FakeLlm::default()),
        "llama3.2",
    ));
    let mut phase = engine.subscribe();

    let builder = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.build_index(&sources()).await })
    };
    phase
        .wait_for(|p| *p == IndexPhase::Indexing)
        .await
        .unwrap();

    builder.abort();
    assert!(builder.await.unwrap_err().is_cancelled());

    assert_eq!(engine.phase(), IndexPhase::Empty);
    let stats = engine.stats().await;
    assert_eq!(stats.phase, IndexPhase::Empty);
    assert_eq!(stats.chunks, 0);

    // The lock is released and a fresh build completes
    engine.build_index(&sources()).await.unwrap();
    assert_eq!(engine.phase(), IndexPhase::Ready);
}
