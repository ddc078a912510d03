//! Embedding provider trait, the deterministic hash embedder, and vector
//! utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that all embedding backends
//! implement. The pipeline only ever talks to the trait, so a hosted model
//! (see the `openai` provider in the application crate) can replace the
//! [`HashEmbedder`] without touching any caller.
//!
//! # Determinism
//!
//! [`HashEmbedder`] is a pure function of its input text: the same text
//! always produces a bit-identical vector. It uses signed feature hashing
//! over lowercase alphanumeric tokens, so texts sharing vocabulary have a
//! positive cosine similarity even though no model is involved.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Default embedding dimensionality used across the system.
pub const DEFAULT_DIMS: usize = 1536;

/// Number of dimensions each token is spread over.
const HASHES_PER_TOKEN: usize = 4;

/// Errors produced while generating embeddings.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding failed for model {model}: {reason}")]
    Failed { model: String, reason: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding timed out after {0}s")]
    Timeout(u64),
}

impl EmbeddingError {
    pub fn failed(model: impl Into<String>, reason: impl ToString) -> Self {
        EmbeddingError::Failed {
            model: model.into(),
            reason: reason.to_string(),
        }
    }
}

/// Trait for embedding providers.
///
/// Implementations must return exactly one vector of [`dims`](EmbeddingProvider::dims)
/// floats per input text, in input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"hash-expansion"`, `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the model version recorded alongside stored vectors.
    fn model_version(&self) -> &str {
        "1"
    }

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::failed(self.model_name(), "empty embedding response"))
    }
}

/// Deterministic placeholder embedder based on signed feature hashing.
///
/// # Example
///
/// ```rust
/// use knowledge_harness_core::embedding::HashEmbedder;
///
/// let embedder = HashEmbedder::new(64);
/// let a = embedder.embed_text("Web3 automation ROI");
/// let b = embedder.embed_text("Web3 automation ROI");
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    /// Synchronously embed one text. Empty or token-less text yields the zero vector.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        if self.dims == 0 {
            return vec;
        }

        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            for slot in digest.chunks_exact(4).take(HASHES_PER_TOKEN) {
                let raw = u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
                let idx = (raw >> 1) as usize % self.dims;
                let sign = if raw & 1 == 0 { 1.0 } else { -1.0 };
                vec[idx] += sign;
            }
        }

        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMS)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-expansion"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
