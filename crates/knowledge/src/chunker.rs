//! Sentence-aware text chunking with overlap.
//!
//! Chunks target `chunk_size` bytes. When a sentence boundary lies within
//! `lookback` bytes before the target end, the chunk ends there instead, as
//! long as the chunk still extends past `start + overlap`. Each chunk starts
//! `overlap` bytes before the previous chunk ended.

use sha2::{Digest, Sha256};
use unicode_segmentation::UnicodeSegmentation;
use viincci_core::{RagConfig, Source};

use crate::types::ChunkSpan;

/// A chunk before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub id: String,
    pub text: String,
    pub position: usize,
    pub span: ChunkSpan,
}

/// Largest char boundary `<= idx`.
fn floor_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Smallest char boundary `> idx`.
fn next_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx + 1;
    while idx < text.len() && !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx.min(text.len())
}

/// Compute chunk spans covering `text`.
pub fn split_spans(
    text: &str,
    chunk_size: usize,
    overlap: usize,
    lookback: usize,
) -> Vec<ChunkSpan> {
    if text.is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    // Byte offsets where a sentence starts (a valid cut point)
    let sentence_starts: Vec<usize> = text
        .split_sentence_bound_indices()
        .map(|(idx, _)| idx)
        .filter(|idx| *idx > 0)
        .collect();

    let mut spans = Vec::new();
    let mut start = 0;
    let mut fresh_start = 0;

    loop {
        let mut end = floor_boundary(text, start + chunk_size);
        if end <= start {
            end = next_boundary(text, start);
        }

        if end < text.len() {
            let window_start = end.saturating_sub(lookback);
            if let Some(cut) = sentence_starts
                .iter()
                .rev()
                .find(|b| **b <= end && **b >= window_start && **b > start + overlap)
            {
                end = *cut;
            }
        }

        spans.push(ChunkSpan {
            start,
            end,
            fresh_start,
        });

        if end >= text.len() {
            break;
        }

        fresh_start = end;
        let mut next = floor_boundary(text, end.saturating_sub(overlap));
        if next <= start {
            next = end;
        }
        start = next;
    }

    spans
}

/// Collapse whitespace runs and trim.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Chunk identity: hash of normalized text and source URL.
pub fn chunk_id(text: &str, source_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    hasher.update(b"\n");
    hasher.update(source_url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Split a source into chunk drafts.
pub fn chunk_source(source: &Source, config: &RagConfig) -> Vec<ChunkDraft> {
    let text = source.raw_text.as_str();
    let drafts: Vec<ChunkDraft> = split_spans(
        text,
        config.chunk_size,
        config.chunk_overlap,
        config.boundary_lookback,
    )
    .into_iter()
    .enumerate()
    .map(|(position, span)| {
        let chunk_text = &text[span.start..span.end];
        ChunkDraft {
            id: chunk_id(chunk_text, &source.url),
            text: chunk_text.to_string(),
            position,
            span,
        }
    })
    .collect();

    tracing::debug!(
        "Chunked {} into {} chunks (size: {}, overlap: {})",
        source.url,
        drafts.len(),
        config.chunk_size,
        config.chunk_overlap
    );

    drafts
}
