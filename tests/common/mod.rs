//! Shared test fixtures: deterministic embedding providers that never
//! touch the network.
#![allow(dead_code)]

use offerdex::embedding::{EmbeddingError, EmbeddingProvider};
use std::sync::atomic::{AtomicUsize, Ordering};

pub const MOCK_DIMENSION: usize = 4;

/// Topic-bucket embedding: texts sharing topic words land close together
/// under cosine distance, which is all the engine tests need.
pub fn embed_text(text: &str) -> Vec<f32> {
    const TOPICS: [&[&str]; 4] = [
        &["book", "novel", "read", "cooking"],
        &["tech", "gadget", "laptop"],
        &["garden", "plant", "flower"],
        &["gift", "romantic", "anniversary"],
    ];

    let lowered = text.to_lowercase();
    let mut vector = vec![0.01_f32; MOCK_DIMENSION];
    for (i, words) in TOPICS.iter().enumerate() {
        for word in *words {
            vector[i] += lowered.matches(word).count() as f32;
        }
    }
    vector
}

/// Deterministic provider for ingestion and query tests.
pub struct MockProvider;

impl EmbeddingProvider for MockProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }
        Ok(embed_text(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}

/// Provider that serves a fixed number of batches, then fails every call.
pub struct FailingProvider {
    succeed_batches: usize,
    batches: AtomicUsize,
}

impl FailingProvider {
    pub fn new(succeed_batches: usize) -> Self {
        Self {
            succeed_batches,
            batches: AtomicUsize::new(0),
        }
    }
}

impl EmbeddingProvider for FailingProvider {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Request(
            "mock provider unavailable".to_string(),
        ))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let served = self.batches.fetch_add(1, Ordering::SeqCst);
        if served < self.succeed_batches {
            return texts.iter().map(|t| Ok(embed_text(t))).collect();
        }
        Err(EmbeddingError::Api {
            status: 429,
            body: "rate limited".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }

    fn model_name(&self) -> &str {
        "failing-embedder"
    }
}
