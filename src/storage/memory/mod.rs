// In-memory backend for the document store and event log
// Used for tests and for running the engine without a database file

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Document, DocumentStore, EventLog, merge_patch};
use crate::Result;

#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, Value>>,
    events: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl MemoryStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents, for diagnostics
    #[inline]
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    #[inline]
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        Ok(self.documents.read().await.get(path).cloned())
    }

    #[inline]
    async fn set(&self, path: &str, body: Value) -> Result<()> {
        self.documents.write().await.insert(path.to_string(), body);
        Ok(())
    }

    #[inline]
    async fn create(&self, path: &str, body: Value) -> Result<bool> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(path) {
            return Ok(false);
        }
        documents.insert(path.to_string(), body);
        Ok(true)
    }

    #[inline]
    async fn merge(&self, path: &str, patch: Value) -> Result<bool> {
        let mut documents = self.documents.write().await;
        match documents.get_mut(path) {
            Some(existing) => {
                merge_patch(existing, &patch);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    #[inline]
    async fn delete(&self, path: &str) -> Result<bool> {
        Ok(self.documents.write().await.remove(path).is_some())
    }

    #[inline]
    async fn query(&self, prefix: &str) -> Result<Vec<Document>> {
        let documents = self.documents.read().await;
        Ok(documents
            .range(prefix.to_string()..)
            .take_while(|(path, _)| path.starts_with(prefix))
            .map(|(path, body)| Document {
                path: path.clone(),
                body: body.clone(),
            })
            .collect())
    }
}

#[async_trait]
impl EventLog for MemoryStore {
    #[inline]
    async fn record(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.events
            .write()
            .await
            .entry(user_id.to_string())
            .or_default()
            .push(at);
        Ok(())
    }

    #[inline]
    async fn count_since(&self, user_id: Option<&str>, since: DateTime<Utc>) -> Result<u64> {
        let events = self.events.read().await;
        let count = match user_id {
            Some(user_id) => events
                .get(user_id)
                .map_or(0, |times| times.iter().filter(|at| **at >= since).count()),
            None => events
                .values()
                .flatten()
                .filter(|at| **at >= since)
                .count(),
        };
        Ok(count as u64)
    }

    #[inline]
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut events = self.events.write().await;
        let mut removed = 0;
        for times in events.values_mut() {
            let before = times.len();
            times.retain(|at| *at >= cutoff);
            removed += before - times.len();
        }
        events.retain(|_, times| !times.is_empty());
        Ok(removed as u64)
    }
}
