// Embeddings module
// Provider abstraction, similarity scoring and the vectorize-or-skip policy

pub mod hashing;
pub mod ollama;
pub mod service;
pub mod similarity;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

use crate::Result;

pub use hashing::HashingProvider;
pub use ollama::OllamaClient;
pub use service::{EmbeddingService, VectorizeOutcome};
pub use similarity::{CosineScorer, SimilarityScorer, content_delta, normalize_text};

/// External service that turns text into a dense vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + std::fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Embed `text` with `model`; implementations must not retry
    async fn embed(&self, text: &str, model: &str, dimensions: u32) -> Result<Vec<f32>>;
}
