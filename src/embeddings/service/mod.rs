// Decides when text needs a fresh embedding and stores the result
// Every failure past validation ends as a logged outcome, never an error for the caller

#[cfg(test)]
mod tests;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{EmbeddingProvider, content_delta};
use crate::clock::Clock;
use crate::config::{ConfigStore, EmbeddingConfig};
use crate::rate_limit::RateLimiter;
use crate::storage::vectors::{DEFAULT_PERFORMANCE_SCORE, text_digest};
use crate::storage::{EmbeddingVector, VectorRepository, bounded};
use crate::{RagError, Result};

/// Default content delta above which text is re-embedded
pub const DEFAULT_RE_VECTORIZE_DELTA: f64 = 0.1;

/// What [`EmbeddingService::vectorize`] did with a piece of content
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum VectorizeOutcome {
    Stored { vector_id: String, replaced: bool },
    RateLimited { reason: String },
    Skipped { reason: String },
    Unchanged,
    Failed { error: String },
}

impl VectorizeOutcome {
    #[inline]
    pub fn is_stored(&self) -> bool {
        matches!(self, Self::Stored { .. })
    }
}

pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    vectors: VectorRepository,
    rate_limiter: Arc<RateLimiter>,
    config: Arc<ConfigStore>,
    clock: Arc<dyn Clock>,
    re_vectorize_delta: f64,
    provider_timeout: Duration,
}

impl fmt::Debug for EmbeddingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddingService")
            .field("provider", &self.provider.name())
            .field("re_vectorize_delta", &self.re_vectorize_delta)
            .field("provider_timeout", &self.provider_timeout)
            .finish_non_exhaustive()
    }
}

impl EmbeddingService {
    #[inline]
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        vectors: VectorRepository,
        rate_limiter: Arc<RateLimiter>,
        config: Arc<ConfigStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            provider,
            vectors,
            rate_limiter,
            config,
            clock,
            re_vectorize_delta: DEFAULT_RE_VECTORIZE_DELTA,
            provider_timeout: Duration::from_secs(30),
        }
    }

    #[inline]
    pub fn with_re_vectorize_delta(mut self, delta: f64) -> Self {
        self.re_vectorize_delta = delta;
        self
    }

    #[inline]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    #[inline]
    pub fn vectors(&self) -> &VectorRepository {
        &self.vectors
    }

    /// Whether `new_text` differs enough from `old_text` to be embedded again
    #[inline]
    pub fn should_re_vectorize(&self, old_text: Option<&str>, new_text: &str) -> bool {
        match old_text {
            None => true,
            Some(old) if old.trim().is_empty() => true,
            Some(old) => content_delta(old, new_text) > self.re_vectorize_delta,
        }
    }

    /// Embed `text` with the configured model, checking the returned dimensions
    #[inline]
    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let config = self.config.load_config().await;
        self.embed_with(&config.embedding, text).await
    }

    async fn embed_with(&self, embedding: &EmbeddingConfig, text: &str) -> Result<Vec<f32>> {
        let vector = bounded(
            self.provider_timeout,
            "embedding request",
            self.provider
                .embed(text, &embedding.model, embedding.dimensions),
        )
        .await?;

        if vector.len() != embedding.dimensions as usize {
            return Err(RagError::Provider(format!(
                "{} returned {} dimensions, expected {}",
                self.provider.name(),
                vector.len(),
                embedding.dimensions
            )));
        }

        Ok(vector)
    }

    /// Embed and store `text` for one piece of content, subject to rate limits
    ///
    /// Re-embedding the same `(content_id, content_type)` replaces the stored
    /// vector in place and keeps its id, performance score and usage.
    #[inline]
    pub async fn vectorize(
        &self,
        user_id: &str,
        content_id: &str,
        content_type: &str,
        text: &str,
    ) -> VectorizeOutcome {
        if text.trim().is_empty() {
            debug!("Skipping empty text for {}/{}", content_type, content_id);
            return VectorizeOutcome::Skipped {
                reason: "empty text".to_string(),
            };
        }

        let decision = self.rate_limiter.check_and_record(user_id).await;
        if !decision.allowed {
            let reason = decision
                .reason
                .unwrap_or_else(|| "rate limited".to_string());
            info!(
                "Not vectorizing {}/{} for {}: {}",
                content_type, content_id, user_id, reason
            );
            return VectorizeOutcome::RateLimited { reason };
        }

        match self.store_embedding(user_id, content_id, content_type, text).await {
            Ok((vector_id, replaced)) => {
                debug!(
                    "Stored vector {} for {}/{} (replaced: {})",
                    vector_id, content_type, content_id, replaced
                );
                VectorizeOutcome::Stored {
                    vector_id,
                    replaced,
                }
            }
            Err(e) => {
                warn!(
                    "Vectorizing {}/{} for {} failed: {}",
                    content_type, content_id, user_id, e
                );
                VectorizeOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn store_embedding(
        &self,
        user_id: &str,
        content_id: &str,
        content_type: &str,
        text: &str,
    ) -> Result<(String, bool)> {
        let config = self.config.load_config().await;
        let vector = self.embed_with(&config.embedding, text).await?;
        let existing = self.vectors.get(user_id, content_type, content_id).await?;

        let record = EmbeddingVector {
            id: existing
                .as_ref()
                .map_or_else(|| Uuid::new_v4().to_string(), |v| v.id.clone()),
            user_id: user_id.to_string(),
            content_id: content_id.to_string(),
            content_type: content_type.to_string(),
            source_text: text.to_string(),
            text_digest: text_digest(text),
            vector,
            model: config.embedding.model.clone(),
            created_at: self.clock.now(),
            performance_score: existing
                .as_ref()
                .map_or(DEFAULT_PERFORMANCE_SCORE, |v| v.performance_score),
            last_used_at: existing.as_ref().and_then(|v| v.last_used_at),
            usage_count: existing.as_ref().map_or(0, |v| v.usage_count),
        };

        self.vectors.upsert(&record).await?;
        Ok((record.id, existing.is_some()))
    }

    /// [`vectorize`](Self::vectorize) only when the text changed beyond the delta threshold
    #[inline]
    pub async fn vectorize_if_changed(
        &self,
        user_id: &str,
        content_id: &str,
        content_type: &str,
        old_text: Option<&str>,
        new_text: &str,
    ) -> VectorizeOutcome {
        if !self.should_re_vectorize(old_text, new_text) {
            debug!(
                "Change to {}/{} below re-vectorize threshold",
                content_type, content_id
            );
            return VectorizeOutcome::Unchanged;
        }

        self.vectorize(user_id, content_id, content_type, new_text)
            .await
    }
}
