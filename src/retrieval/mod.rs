// Context retrieval
// Scores a user's stored vectors against a query and assembles a bounded context string


use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::config::{ConfigStore, PerformanceConfig};
use crate::embeddings::{EmbeddingService, SimilarityScorer};
use crate::storage::{EmbeddingVector, VectorRef, VectorRepository};
use crate::Result;

pub const DEFAULT_LIMIT: usize = 5;
pub const CONTEXT_SEPARATOR: &str = "\n\n";
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

#[inline]
fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalOptions {
    pub user_id: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl RetrievalOptions {
    #[inline]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            content_type: None,
            limit: DEFAULT_LIMIT,
        }
    }

    #[inline]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[inline]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// One vector that made it into the context
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedVector {
    pub vector_id: String,
    #[serde(flatten)]
    pub reference: VectorRef,
    /// The part of the source text included in the context
    pub text: String,
    pub similarity: f32,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextBundle {
    pub retrieved: Vec<RetrievedVector>,
    pub content_type: Option<String>,
    pub context: String,
    /// The length limit the context was assembled under, in characters
    pub truncated_to_length: usize,
    pub truncated: bool,
    pub assembled_at: DateTime<Utc>,
}

impl ContextBundle {
    #[inline]
    pub fn empty(content_type: Option<String>, max_length: usize, now: DateTime<Utc>) -> Self {
        Self {
            retrieved: Vec::new(),
            content_type,
            context: String::new(),
            truncated_to_length: max_length,
            truncated: false,
            assembled_at: now,
        }
    }

    /// No candidate passed the threshold; generate without grounding
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.retrieved.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    query: String,
    content_type: Option<String>,
    user_id: String,
    limit: usize,
}

/// Join `texts` in rank order, cutting the last included text so the result fits `max_chars`
///
/// Returns the context and, per included text, the fragment used and whether it was cut.
#[inline]
pub fn assemble_context(texts: &[&str], max_chars: usize) -> (String, Vec<(String, bool)>) {
    let separator_len = CONTEXT_SEPARATOR.chars().count();
    let mut context = String::new();
    let mut used = 0;
    let mut fragments = Vec::new();

    for text in texts {
        let gap = if fragments.is_empty() { 0 } else { separator_len };
        let remaining = max_chars.saturating_sub(used + gap);
        if remaining == 0 {
            break;
        }

        if gap > 0 {
            context.push_str(CONTEXT_SEPARATOR);
        }

        let length = text.chars().count();
        if length <= remaining {
            context.push_str(text);
            used += gap + length;
            fragments.push(((*text).to_string(), false));
        } else {
            let fragment: String = text.chars().take(remaining).collect();
            context.push_str(&fragment);
            fragments.push((fragment, true));
            break;
        }
    }

    (context, fragments)
}

fn rank(a: &(EmbeddingVector, f32), b: &(EmbeddingVector, f32)) -> Ordering {
    b.1.total_cmp(&a.1)
        .then_with(|| b.0.last_used_at.cmp(&a.0.last_used_at))
}

pub struct ContextRetriever {
    vectors: VectorRepository,
    embeddings: Arc<EmbeddingService>,
    scorer: Arc<dyn SimilarityScorer>,
    config: Arc<ConfigStore>,
    clock: Arc<dyn Clock>,
    cache: TtlCache<CacheKey, ContextBundle>,
}

impl fmt::Debug for ContextRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextRetriever")
            .field("scorer", &self.scorer)
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl ContextRetriever {
    #[inline]
    pub fn new(
        vectors: VectorRepository,
        embeddings: Arc<EmbeddingService>,
        scorer: Arc<dyn SimilarityScorer>,
        config: Arc<ConfigStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cache: TtlCache::new(DEFAULT_CACHE_CAPACITY, Arc::clone(&clock)),
            vectors,
            embeddings,
            scorer,
            config,
            clock,
        }
    }

    #[inline]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = TtlCache::new(capacity, Arc::clone(&self.clock));
        self
    }

    /// Most relevant stored content for `query`, bounded by the configured context length
    ///
    /// Never fails: provider or storage trouble yields an empty bundle.
    #[inline]
    pub async fn retrieve_relevant_context(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> ContextBundle {
        let config = self.config.load_config().await;
        let performance = &config.performance;
        let max_length = performance.max_context_length as usize;
        let now = self.clock.now();

        if options.limit == 0 || query.trim().is_empty() {
            return ContextBundle::empty(options.content_type.clone(), max_length, now);
        }

        let key = CacheKey {
            query: query.to_string(),
            content_type: options.content_type.clone(),
            user_id: options.user_id.clone(),
            limit: options.limit,
        };

        if performance.cache_enabled {
            if let Some(bundle) = self.cache.get(&key) {
                debug!("Context cache hit for {}", options.user_id);
                return bundle;
            }
        }

        let bundle = match self.assemble(query, options, performance, now).await {
            Ok(bundle) => bundle,
            Err(e) => {
                warn!(
                    "Context retrieval for {} failed, continuing without context: {}",
                    options.user_id, e
                );
                return ContextBundle::empty(options.content_type.clone(), max_length, now);
            }
        };

        if performance.cache_enabled {
            match i64::try_from(performance.cache_ttl)
                .ok()
                .and_then(chrono::Duration::try_seconds)
            {
                Some(ttl) => self.cache.insert(key, bundle.clone(), ttl),
                None => warn!(
                    "Context cache TTL of {}s is out of range, not caching",
                    performance.cache_ttl
                ),
            }
        }

        bundle
    }

    async fn assemble(
        &self,
        query: &str,
        options: &RetrievalOptions,
        performance: &PerformanceConfig,
        now: DateTime<Utc>,
    ) -> Result<ContextBundle> {
        let max_length = performance.max_context_length as usize;
        let candidates = self
            .vectors
            .list_for_user(&options.user_id, options.content_type.as_deref())
            .await?;

        if candidates.is_empty() {
            debug!("No stored vectors for {}", options.user_id);
            return Ok(ContextBundle::empty(
                options.content_type.clone(),
                max_length,
                now,
            ));
        }

        let query_vector = self.embeddings.generate_embedding(query).await?;

        let mut scored: Vec<(EmbeddingVector, f32)> = candidates
            .into_iter()
            .filter_map(|vector| match self.scorer.score(&query_vector, &vector.vector) {
                Some(score) => Some((vector, score)),
                None => {
                    debug!("Vector {} is not comparable with the query", vector.id);
                    None
                }
            })
            .filter(|(_, score)| *score >= performance.similarity_threshold)
            .collect();

        scored.sort_by(rank);
        scored.truncate(options.limit);

        let texts: Vec<&str> = scored
            .iter()
            .map(|(vector, _)| vector.source_text.as_str())
            .collect();
        let (context, fragments) = assemble_context(&texts, max_length);

        let retrieved: Vec<RetrievedVector> = scored
            .iter()
            .zip(fragments)
            .map(|((vector, score), (text, truncated))| RetrievedVector {
                vector_id: vector.id.clone(),
                reference: vector.vector_ref(),
                text,
                similarity: *score,
                truncated,
            })
            .collect();

        self.record_usage(&scored[..retrieved.len()], now).await;

        debug!(
            "Retrieved {} vectors ({} chars) for {}",
            retrieved.len(),
            context.chars().count(),
            options.user_id
        );

        Ok(ContextBundle {
            truncated: retrieved.iter().any(|r| r.truncated),
            retrieved,
            content_type: options.content_type.clone(),
            context,
            truncated_to_length: max_length,
            assembled_at: now,
        })
    }

    async fn record_usage(&self, used: &[(EmbeddingVector, f32)], now: DateTime<Utc>) {
        let touches = used
            .iter()
            .map(|(vector, _)| self.vectors.touch(vector, now));

        for ((vector, _), result) in used.iter().zip(futures::future::join_all(touches).await) {
            match result {
                Ok(true) => {}
                Ok(false) => debug!("Vector {} vanished before its usage was recorded", vector.id),
                Err(e) => debug!("Could not record usage of {}: {}", vector.id, e),
            }
        }
    }

    /// Drop every cached bundle
    #[inline]
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
