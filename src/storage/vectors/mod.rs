// Embedding vector repository
// One document per (user, content type, content id) under embeddings/


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{BoundedStore, decode_segment, path_segment};
use crate::Result;

const COLLECTION: &str = "embeddings";

/// Performance score given to vectors that have not received feedback yet
pub const DEFAULT_PERFORMANCE_SCORE: f32 = 0.5;

#[inline]
fn default_performance_score() -> f32 {
    DEFAULT_PERFORMANCE_SCORE
}

/// A stored embedding and the content it was generated from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingVector {
    pub id: String,
    pub user_id: String,
    pub content_id: String,
    pub content_type: String,
    pub source_text: String,
    pub text_digest: String,
    pub vector: Vec<f32>,
    #[serde(default)]
    pub model: String,
    pub created_at: DateTime<Utc>,
    #[serde(default = "default_performance_score")]
    pub performance_score: f32,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_count: u64,
}

/// Address of a vector without its payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRef {
    pub content_id: String,
    pub content_type: String,
}

impl EmbeddingVector {
    #[inline]
    pub fn vector_ref(&self) -> VectorRef {
        VectorRef {
            content_id: self.content_id.clone(),
            content_type: self.content_type.clone(),
        }
    }

    /// Age in whole days relative to `now`
    #[inline]
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.created_at).num_days()
    }
}

/// Hex-encoded SHA-256 digest of the embedded text
#[inline]
pub fn text_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

#[derive(Debug, Clone)]
pub struct VectorRepository {
    store: BoundedStore,
}

impl VectorRepository {
    #[inline]
    pub fn new(store: BoundedStore) -> Self {
        Self { store }
    }

    #[inline]
    pub fn document_path(user_id: &str, content_type: &str, content_id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            COLLECTION,
            path_segment(user_id),
            path_segment(content_type),
            path_segment(content_id)
        )
    }

    fn user_prefix(user_id: &str, content_type: Option<&str>) -> String {
        match content_type {
            Some(content_type) => format!(
                "{}/{}/{}/",
                COLLECTION,
                path_segment(user_id),
                path_segment(content_type)
            ),
            None => format!("{}/{}/", COLLECTION, path_segment(user_id)),
        }
    }

    #[inline]
    pub async fn get(
        &self,
        user_id: &str,
        content_type: &str,
        content_id: &str,
    ) -> Result<Option<EmbeddingVector>> {
        let path = Self::document_path(user_id, content_type, content_id);
        self.store.get_as(&path).await
    }

    /// Insert or replace the vector for its (content id, content type) pair
    #[inline]
    pub async fn upsert(&self, vector: &EmbeddingVector) -> Result<()> {
        let path = Self::document_path(&vector.user_id, &vector.content_type, &vector.content_id);
        debug!("Upserting vector {} at {}", vector.id, path);
        self.store.set_as(&path, vector).await
    }

    /// Vectors owned by `user_id`, optionally restricted to one content type
    #[inline]
    pub async fn list_for_user(
        &self,
        user_id: &str,
        content_type: Option<&str>,
    ) -> Result<Vec<EmbeddingVector>> {
        let prefix = Self::user_prefix(user_id, content_type);
        let documents = self.store.query(&prefix).await?;
        Ok(Self::decode_all(documents))
    }

    /// Every stored vector across all users
    #[inline]
    pub async fn list_all(&self) -> Result<Vec<EmbeddingVector>> {
        let documents = self.store.query(&format!("{}/", COLLECTION)).await?;
        Ok(Self::decode_all(documents))
    }

    fn decode_all(documents: Vec<super::Document>) -> Vec<EmbeddingVector> {
        documents
            .into_iter()
            .filter_map(|document| {
                match serde_json::from_value::<EmbeddingVector>(document.body) {
                    Ok(vector) => Some(vector),
                    Err(e) => {
                        warn!("Skipping malformed vector at {}: {}", document.path, e);
                        None
                    }
                }
            })
            .collect()
    }

    #[inline]
    pub async fn delete(&self, vector: &EmbeddingVector) -> Result<bool> {
        let path = Self::document_path(&vector.user_id, &vector.content_type, &vector.content_id);
        self.store.delete(&path).await
    }

    /// Stamp a retrieval; returns `false` if the vector no longer exists
    #[inline]
    pub async fn touch(
        &self,
        vector: &EmbeddingVector,
        used_at: DateTime<Utc>,
    ) -> Result<bool> {
        let path = Self::document_path(&vector.user_id, &vector.content_type, &vector.content_id);
        self.store
            .merge(
                &path,
                json!({
                    "lastUsedAt": used_at,
                    "usageCount": vector.usage_count + 1,
                }),
            )
            .await
    }

    /// Overwrite the performance score; returns `false` if the vector no longer exists
    #[inline]
    pub async fn set_performance_score(
        &self,
        user_id: &str,
        reference: &VectorRef,
        score: f32,
    ) -> Result<bool> {
        let path = Self::document_path(user_id, &reference.content_type, &reference.content_id);
        self.store
            .merge(&path, json!({ "performanceScore": score }))
            .await
    }

    /// Distinct user ids that own at least one vector
    #[inline]
    pub async fn users(&self) -> Result<Vec<String>> {
        let documents = self.store.query(&format!("{}/", COLLECTION)).await?;
        let mut users: Vec<String> = documents
            .iter()
            .filter_map(|document| document.path.split('/').nth(1).map(decode_segment))
            .collect();
        users.dedup();
        Ok(users)
    }
}
