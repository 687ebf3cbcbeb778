// Storage module
// Document store and rate-limit event log abstractions, plus the in-memory and SQLite backends


#[cfg(test)]
pub(crate) mod testing;

pub mod memory;
pub mod sqlite;
pub mod vectors;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{RagError, Result};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use vectors::{EmbeddingVector, VectorRef, VectorRepository};

const RETRY_BACKOFF_BASE: u64 = 2;

/// A JSON document and the path it is stored under
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: String,
    pub body: Value,
}

/// Document store keyed by slash-separated paths
///
/// Every write replaces or patches a whole document in one step, so readers
/// never observe a partially written document.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &str) -> Result<Option<Value>>;

    async fn set(&self, path: &str, body: Value) -> Result<()>;

    /// Write `body` only if nothing is stored at `path` yet; returns whether it was written
    async fn create(&self, path: &str, body: Value) -> Result<bool>;

    /// Apply a JSON merge patch to an existing document
    ///
    /// Returns `false` without writing anything when the document does not exist.
    async fn merge(&self, path: &str, patch: Value) -> Result<bool>;

    async fn delete(&self, path: &str) -> Result<bool>;

    /// All documents whose path starts with `prefix`, ordered by path
    async fn query(&self, prefix: &str) -> Result<Vec<Document>>;
}

/// Append-only log of embedding-generation events used for rate limiting
#[async_trait]
pub trait EventLog: Send + Sync {
    async fn record(&self, user_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Count events at or after `since`, for one user or across all users
    async fn count_since(&self, user_id: Option<&str>, since: DateTime<Utc>) -> Result<u64>;

    /// Delete events older than `cutoff`
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Timeout and retry policy applied to every storage call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoragePolicy {
    pub timeout: Duration,
    pub read_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for StoragePolicy {
    #[inline]
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            read_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Document store handle that bounds every call with a timeout and retries reads
#[derive(Clone)]
pub struct BoundedStore {
    inner: Arc<dyn DocumentStore>,
    policy: StoragePolicy,
}

impl std::fmt::Debug for BoundedStore {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedStore")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BoundedStore {
    #[inline]
    pub fn new(inner: Arc<dyn DocumentStore>, policy: StoragePolicy) -> Self {
        Self { inner, policy }
    }

    #[inline]
    pub fn policy(&self) -> StoragePolicy {
        self.policy
    }

    #[inline]
    pub async fn get(&self, path: &str) -> Result<Option<Value>> {
        read_with_retry(&self.policy, path, || self.inner.get(path)).await
    }

    /// Fetch and deserialize a document, treating undecodable bodies as an error
    #[inline]
    pub async fn get_as<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        match self.get(path).await? {
            Some(body) => serde_json::from_value(body)
                .map(Some)
                .map_err(|e| RagError::Other(anyhow::anyhow!("Malformed document {}: {}", path, e))),
            None => Ok(None),
        }
    }

    #[inline]
    pub async fn set(&self, path: &str, body: Value) -> Result<()> {
        bounded(self.policy.timeout, path, self.inner.set(path, body)).await
    }

    #[inline]
    pub async fn set_as<T: Serialize + Sync>(&self, path: &str, document: &T) -> Result<()> {
        let body = serde_json::to_value(document)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to serialize {}: {}", path, e)))?;
        self.set(path, body).await
    }

    #[inline]
    pub async fn create_as<T: Serialize + Sync>(&self, path: &str, document: &T) -> Result<bool> {
        let body = serde_json::to_value(document)
            .map_err(|e| RagError::Other(anyhow::anyhow!("Failed to serialize {}: {}", path, e)))?;
        bounded(self.policy.timeout, path, self.inner.create(path, body)).await
    }

    #[inline]
    pub async fn merge(&self, path: &str, patch: Value) -> Result<bool> {
        bounded(self.policy.timeout, path, self.inner.merge(path, patch)).await
    }

    #[inline]
    pub async fn delete(&self, path: &str) -> Result<bool> {
        bounded(self.policy.timeout, path, self.inner.delete(path)).await
    }

    #[inline]
    pub async fn query(&self, prefix: &str) -> Result<Vec<Document>> {
        read_with_retry(&self.policy, prefix, || self.inner.query(prefix)).await
    }
}

/// Run `operation` with a deadline, mapping expiry to `RagError::Timeout`
#[inline]
pub async fn bounded<T, F>(timeout: Duration, operation: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(timeout, future)
        .await
        .unwrap_or_else(|_| Err(RagError::Timeout(operation.to_string())))
}

/// Retry a read with exponential backoff; each attempt is individually bounded
///
/// Only errors for which [`RagError::is_unavailable`] holds are retried.
#[inline]
pub async fn read_with_retry<T, F, Fut>(
    policy: &StoragePolicy,
    operation: &str,
    mut read: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.read_attempts.max(1);
    let mut attempt = 1;

    loop {
        match bounded(policy.timeout, operation, read()).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && e.is_unavailable() => {
                warn!(
                    "Read '{}' failed (attempt {}/{}): {}",
                    operation, attempt, attempts, e
                );
                let delay = policy.retry_backoff * RETRY_BACKOFF_BASE.pow(attempt - 1) as u32;
                debug!("Waiting {:?} before retry", delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Apply an RFC 7396 JSON merge patch in place
#[inline]
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_fields) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }

    if let Value::Object(target_fields) = target {
        for (key, value) in patch_fields {
            if value.is_null() {
                target_fields.remove(key);
            } else {
                merge_patch(
                    target_fields.entry(key.clone()).or_insert(Value::Null),
                    value,
                );
            }
        }
    }
}

/// Escape a value for use as a single path segment
#[inline]
pub fn path_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Inverse of [`path_segment`]
#[inline]
pub fn decode_segment(segment: &str) -> String {
    url::form_urlencoded::parse(format!("s={}", segment).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}
