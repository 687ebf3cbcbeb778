// Feedback ingestion
// Ratings update per-user RAG vs baseline metrics and nudge the scores of the vectors that were used


use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::ConfigError;
use crate::storage::{BoundedStore, VectorRef, VectorRepository, path_segment};
use crate::Result;

pub const FEEDBACK_COLLECTION: &str = "feedback";
pub const METRICS_COLLECTION: &str = "rag_metrics";
pub const DEFAULT_LEARNING_RATE: f32 = 0.2;

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRecord {
    pub content_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub rating: u8,
    #[serde(rename = "wasRAGEnhanced", default)]
    pub was_rag_enhanced: bool,
    #[serde(rename = "ragContextUsed", default)]
    pub rag_context_used: Vec<VectorRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl FeedbackRecord {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::MissingField("userId"));
        }
        if self.content_id.trim().is_empty() {
            return Err(ConfigError::MissingField("contentId"));
        }
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            return Err(ConfigError::InvalidRating(self.rating));
        }
        Ok(())
    }

    /// Rating mapped onto [0, 1]
    #[inline]
    pub fn normalized_rating(&self) -> f32 {
        f32::from(self.rating.clamp(MIN_RATING, MAX_RATING) - MIN_RATING)
            / f32::from(MAX_RATING - MIN_RATING)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredFeedback {
    id: String,
    #[serde(flatten)]
    record: FeedbackRecord,
    recorded_at: DateTime<Utc>,
}

/// Running rating totals for one user, split by whether RAG was used
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RagMetrics {
    pub rag_count: u64,
    pub rag_rating_sum: u64,
    pub baseline_count: u64,
    pub baseline_rating_sum: u64,
    pub last_feedback_at: Option<DateTime<Utc>>,
}

impl RagMetrics {
    #[inline]
    pub fn rag_average(&self) -> Option<f64> {
        (self.rag_count > 0).then(|| self.rag_rating_sum as f64 / self.rag_count as f64)
    }

    #[inline]
    pub fn baseline_average(&self) -> Option<f64> {
        (self.baseline_count > 0)
            .then(|| self.baseline_rating_sum as f64 / self.baseline_count as f64)
    }

    /// Average RAG rating minus average baseline rating, once both exist
    #[inline]
    pub fn lift(&self) -> Option<f64> {
        Some(self.rag_average()? - self.baseline_average()?)
    }

    fn add(&mut self, feedback: &FeedbackRecord, at: DateTime<Utc>) {
        if feedback.was_rag_enhanced {
            self.rag_count += 1;
            self.rag_rating_sum += u64::from(feedback.rating);
        } else {
            self.baseline_count += 1;
            self.baseline_rating_sum += u64::from(feedback.rating);
        }
        self.last_feedback_at = Some(at);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSummary {
    pub feedback_id: String,
    pub metrics: RagMetrics,
    pub vectors_updated: usize,
    pub vectors_missing: usize,
}

#[derive(Debug)]
pub struct FeedbackService {
    store: BoundedStore,
    vectors: VectorRepository,
    clock: Arc<dyn Clock>,
    learning_rate: f32,
}

impl FeedbackService {
    #[inline]
    pub fn new(store: BoundedStore, vectors: VectorRepository, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            vectors,
            clock,
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }

    #[inline]
    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate.clamp(f32::EPSILON, 1.0);
        self
    }

    #[inline]
    pub fn metrics_path(user_id: &str) -> String {
        format!("{}/{}", METRICS_COLLECTION, path_segment(user_id))
    }

    #[inline]
    pub async fn metrics(&self, user_id: &str) -> Result<RagMetrics> {
        Ok(self
            .store
            .get_as(&Self::metrics_path(user_id))
            .await?
            .unwrap_or_default())
    }

    /// Store `feedback`, update the user's metrics and the scores of the vectors it used
    #[inline]
    pub async fn record(&self, feedback: FeedbackRecord) -> Result<FeedbackSummary> {
        feedback.validate()?;
        let now = self.clock.now();

        let stored = StoredFeedback {
            id: Uuid::new_v4().to_string(),
            record: feedback,
            recorded_at: now,
        };
        let path = format!(
            "{}/{}/{}",
            FEEDBACK_COLLECTION,
            path_segment(&stored.record.user_id),
            stored.id
        );
        self.store.set_as(&path, &stored).await?;

        let feedback = &stored.record;
        let mut metrics = self.metrics(&feedback.user_id).await?;
        metrics.add(feedback, now);
        self.store
            .set_as(&Self::metrics_path(&feedback.user_id), &metrics)
            .await?;

        let (vectors_updated, vectors_missing) = if feedback.was_rag_enhanced {
            self.update_scores(feedback).await
        } else {
            (0, 0)
        };

        info!(
            "Recorded feedback {} from {} (rating {}, RAG: {})",
            stored.id, feedback.user_id, feedback.rating, feedback.was_rag_enhanced
        );

        Ok(FeedbackSummary {
            feedback_id: stored.id.clone(),
            metrics,
            vectors_updated,
            vectors_missing,
        })
    }

    async fn update_scores(&self, feedback: &FeedbackRecord) -> (usize, usize) {
        let target = feedback.normalized_rating();
        let mut updated = 0;
        let mut missing = 0;

        for reference in &feedback.rag_context_used {
            let vector = match self
                .vectors
                .get(&feedback.user_id, &reference.content_type, &reference.content_id)
                .await
            {
                Ok(Some(vector)) => vector,
                Ok(None) => {
                    debug!(
                        "Vector {}/{} no longer exists, skipping score update",
                        reference.content_type, reference.content_id
                    );
                    missing += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        "Could not load vector {}/{}: {}",
                        reference.content_type, reference.content_id, e
                    );
                    continue;
                }
            };

            let score = (vector.performance_score
                + self.learning_rate * (target - vector.performance_score))
                .clamp(0.0, 1.0);

            match self
                .vectors
                .set_performance_score(&feedback.user_id, reference, score)
                .await
            {
                Ok(true) => updated += 1,
                Ok(false) => missing += 1,
                Err(e) => warn!(
                    "Could not update score of {}/{}: {}",
                    reference.content_type, reference.content_id, e
                ),
            }
        }

        (updated, missing)
    }
}
