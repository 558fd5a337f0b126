//! Ranking behaviour of the in-memory index.

use crate::index::MemoryIndex;
use crate::types::{Chunk, ChunkSpan, EmbeddingSignature};

fn signature(dimensions: usize) -> EmbeddingSignature {
    EmbeddingSignature {
        provider: "test".to_string(),
        model: "fixed".to_string(),
        dimensions,
    }
}

fn chunk(id: &str, source_url: &str, text: &str, embedding: Vec<f32>) -> Chunk {
    Chunk {
        id: id.to_string(),
        source_url: source_url.to_string(),
        source_title: String::new(),
        text: text.to_string(),
        embedding,
        position: 0,
        span: ChunkSpan {
            start: 0,
            end: text.len(),
            fresh_start: 0,
        },
    }
}

fn index_of(chunks: Vec<Chunk>) -> MemoryIndex {
    let mut index = MemoryIndex::new();
    let dims = chunks.first().map(|c| c.embedding.len()).unwrap_or(3);
    for c in chunks {
        index.insert(c, &signature(dims)).unwrap();
    }
    index
}

#[test]
fn test_relevant_chunk_ranks_first() {
    let index = index_of(vec![
        chunk(
            "rust",
            "https://a.org",
            "Rust is a systems programming language",
            vec![1.0, 0.5, 0.2, 0.1],
        ),
        chunk(
            "pasta",
            "https://b.org",
            "Cooking recipes for pasta",
            vec![-0.3, -0.8, 0.4, -0.2],
        ),
    ]);

    let results = index.search(&[0.9, 0.4, 0.3, 0.1], 5).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0.id, "rust");
    assert!(results[0].1 > 0.8, "score: {}", results[0].1);
    assert!(results[0].1 > results[1].1);
}

#[test]
fn test_scores_descending_and_bounded() {
    let index = index_of(vec![
        chunk("a", "u", "A", vec![1.0, 0.0, 0.0]),
        chunk("b", "u", "B", vec![0.7, 0.7, 0.0]),
        chunk("c", "u", "C", vec![0.0, 1.0, 0.0]),
        chunk("d", "u", "D", vec![-1.0, 0.0, 0.0]),
    ]);

    let results = index.search(&[1.0, 0.0, 0.0], 10).unwrap();
    let ids: Vec<&str> = results.iter().map(|(c, _)| c.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c", "d"]);

    for pair in results.windows(2) {
        assert!(pair[0].1 >= pair[1].1);
    }
    assert!(results.iter().all(|(_, s)| (-1.0..=1.0).contains(s)));
    assert!(results[0].1 > 0.99);
    assert!(results[3].1 < -0.99);
}

#[test]
fn test_equal_scores_keep_insertion_order() {
    let index = index_of(vec![
        chunk("first", "u", "same", vec![0.0, 1.0]),
        chunk("second", "u", "same again", vec![0.0, 2.0]),
        chunk("third", "u", "other", vec![1.0, 0.0]),
    ]);

    let results = index.search(&[0.0, 1.0], 2).unwrap();
    assert_eq!(results[0].0.id, "first");
    assert_eq!(results[1].0.id, "second");
}

#[test]
fn test_single_chunk_always_retrieved() {
    let index = index_of(vec![chunk("only", "u", "x", vec![1.0, 0.0, 0.0])]);
    let results = index.search(&[0.0, 1.0, 0.0], 1).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0.id, "only");
    assert!(results[0].1.abs() < 1e-6);
}

#[test]
fn test_top_k_limit_respected() {
    let index = index_of(
        (0..10)
            .map(|i| {
                chunk(
                    &format!("c{}", i),
                    "u",
                    "t",
                    vec![i as f32 / 10.0, 1.0, 0.0],
                )
            })
            .collect(),
    );
    assert_eq!(index.search(&[1.0, 0.0, 0.0], 3).unwrap().len(), 3);
    assert_eq!(index.search(&[1.0, 0.0, 0.0], 50).unwrap().len(), 10);
}

#[test]
fn test_empty_index_returns_nothing() {
    let index = MemoryIndex::new();
    assert!(index.search(&[1.0, 0.0], 5).unwrap().is_empty());
}

#[test]
fn test_duplicate_id_is_skipped() {
    let mut index = MemoryIndex::new();
    let sig = signature(2);
    assert!(index.insert(chunk("x", "u", "t", vec![1.0, 0.0]), &sig).unwrap());
    assert!(!index.insert(chunk("x", "u", "t", vec![0.0, 1.0]), &sig).unwrap());
    assert_eq!(index.len(), 1);
    assert_eq!(index.source_count(), 1);
}

#[test]
fn test_dimension_and_signature_mismatch_rejected() {
    let mut index = MemoryIndex::new();
    index
        .insert(chunk("x", "u", "t", vec![1.0, 0.0]), &signature(2))
        .unwrap();

    assert!(index
        .insert(chunk("y", "u", "t", vec![1.0, 0.0, 0.0]), &signature(2))
        .is_err());
    assert!(index
        .insert(chunk("z", "u", "t", vec![1.0, 0.0, 0.0]), &signature(3))
        .is_err());
    assert!(matches!(
        index.search(&[1.0, 0.0, 0.0], 1),
        Err(viincci_core::AppError::Generation(_))
    ));
}
