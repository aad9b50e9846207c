//! Embedding abstraction.
//!
//! Spec §3 requires the embedding model to produce an embedding
//! *deterministically* from a chunk's text — it is scoped as an external
//! collaborator (§1), not a network service to call. `DeterministicEmbedder`
//! stands in for a local sentence-transformer model: it hashes the input
//! with SHA-256 and expands the digest into a fixed-dimension float vector
//! via a seeded PRNG, so the same text always yields the same vector and no
//! network or model download is required.

use crate::errors::Result;
use async_trait::async_trait;
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use sha2::{Digest, Sha256};

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    fn model_name(&self) -> &str;
    fn dimension(&self) -> usize;
}

/// Deterministic, hash-seeded embedder.
pub struct DeterministicEmbedder {
    model_name: String,
    dimension: usize,
}

impl DeterministicEmbedder {
    pub fn new(model_name: impl Into<String>, dimension: usize) -> Self {
        Self { model_name: model_name.into(), dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        let seed: [u8; 32] = digest.into();
        let mut rng = StdRng::from_seed(seed);

        let raw: Vec<f32> = (0..self.dimension).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
        let norm = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm == 0.0 {
            raw
        } else {
            raw.into_iter().map(|v| v / norm).collect()
        }
    }
}

#[async_trait]
impl Embedder for DeterministicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.encode(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.encode(t)).collect())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedding_is_deterministic() {
        let embedder = DeterministicEmbedder::new("test-model", 384);
        let a = embedder.embed("Paris is the capital of France").await.unwrap();
        let b = embedder.embed("Paris is the capital of France").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 384);
    }

    #[tokio::test]
    async fn distinct_text_yields_distinct_vectors() {
        let embedder = DeterministicEmbedder::new("test-model", 384);
        let a = embedder.embed("hello").await.unwrap();
        let b = embedder.embed("goodbye").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn batch_matches_individual() {
        let embedder = DeterministicEmbedder::new("test-model", 64);
        let texts = vec!["one".to_string(), "two".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        let individual = embedder.embed("one").await.unwrap();
        assert_eq!(batch[0], individual);
    }
}
