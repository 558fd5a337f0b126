//! Feature-hashing embedding provider.
//!
//! Deterministic, content-dependent vectors built from word and character
//! trigram features. Not semantic, but similar wording lands close together,
//! which is enough for offline use and tests.

use std::collections::HashMap;

use viincci_core::AppResult;

use crate::embeddings::provider::EmbeddingProvider;

const STOP_WORDS: &[&str] = &[
    "the", "is", "at", "which", "on", "a", "an", "as", "are", "was", "were", "for", "to", "of",
    "in", "and", "or", "but", "with", "by", "from", "this", "that", "be", "have", "has", "had",
    "it", "its", "their", "they", "them", "what", "how", "does", "can",
];

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(FNV_OFFSET, |acc, b| (acc ^ u64::from(*b)).wrapping_mul(FNV_PRIME))
}

/// Word and trigram hashing provider.
#[derive(Debug, Clone)]
pub struct HashingProvider {
    model: String,
    dimensions: usize,
}

impl HashingProvider {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions: dimensions.max(1),
        }
    }

    fn terms(text: &str) -> HashMap<String, usize> {
        let lower = text.to_lowercase();
        let mut freq = HashMap::new();
        for word in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        {
            *freq.entry(word.to_string()).or_insert(0) += 1;
        }
        freq
    }

    /// Add `weight` at the hashed slot; the top hash bit picks the sign.
    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let slot = (hash % self.dimensions as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[slot] += sign * weight;
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; self.dimensions];

        for (word, count) in Self::terms(text) {
            let weight = (count as f32).sqrt();
            self.accumulate(&mut vector, word.as_bytes(), 2.0 * weight);

            let padded: Vec<char> = format!("^{}$", word).chars().collect();
            for window in padded.windows(3) {
                let trigram: String = window.iter().collect();
                self.accumulate(&mut vector, trigram.as_bytes(), weight);
            }
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HashingProvider {
    fn provider_name(&self) -> &str {
        "hashing"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn test_deterministic_and_normalized() {
        let provider = HashingProvider::new("trigram-v1", 128);
        let a = provider.embed("Ferns reproduce with spores").await.unwrap();
        let b = provider.embed("Ferns reproduce with spores").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        assert!((dot(&a, &a) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_similar_text_scores_higher() {
        let provider = HashingProvider::new("trigram-v1", 384);
        let query = provider.embed("fern spores").await.unwrap();
        let fern = provider
            .embed("Ferns spread by releasing spores from sori")
            .await
            .unwrap();
        let engine = provider
            .embed("Diesel engines compress air before injecting fuel")
            .await
            .unwrap();

        assert!(dot(&query, &fern) > dot(&query, &engine));
    }

    #[tokio::test]
    async fn test_stop_words_only_is_zero_vector() {
        let provider = HashingProvider::new("trigram-v1", 64);
        let v = provider.embed("the and of it").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = HashingProvider::new("trigram-v1", 64);
        let texts = vec!["oak timber".to_string(), "prime numbers".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[1], provider.embed("prime numbers").await.unwrap());
    }
}
