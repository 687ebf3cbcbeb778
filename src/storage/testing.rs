// Store doubles for exercising degraded paths

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{Document, DocumentStore, EventLog};
use crate::{RagError, Result};

/// Every call fails as if the backend were unreachable
#[derive(Debug, Default)]
pub struct UnavailableStore;

fn down<T>() -> Result<T> {
    Err(RagError::StorageUnavailable("backend unreachable".to_string()))
}

#[async_trait]
impl DocumentStore for UnavailableStore {
    async fn get(&self, _path: &str) -> Result<Option<Value>> {
        down()
    }

    async fn set(&self, _path: &str, _body: Value) -> Result<()> {
        down()
    }

    async fn create(&self, _path: &str, _body: Value) -> Result<bool> {
        down()
    }

    async fn merge(&self, _path: &str, _patch: Value) -> Result<bool> {
        down()
    }

    async fn delete(&self, _path: &str) -> Result<bool> {
        down()
    }

    async fn query(&self, _prefix: &str) -> Result<Vec<Document>> {
        down()
    }
}

#[async_trait]
impl EventLog for UnavailableStore {
    async fn record(&self, _user_id: &str, _at: DateTime<Utc>) -> Result<()> {
        down()
    }

    async fn count_since(&self, _user_id: Option<&str>, _since: DateTime<Utc>) -> Result<u64> {
        down()
    }

    async fn prune_before(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
        down()
    }
}

/// Every call hangs for `delay` before answering with nothing
#[derive(Debug)]
pub struct StalledStore {
    pub delay: Duration,
}

#[async_trait]
impl DocumentStore for StalledStore {
    async fn get(&self, _path: &str) -> Result<Option<Value>> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn set(&self, _path: &str, _body: Value) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn create(&self, _path: &str, _body: Value) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        Ok(true)
    }

    async fn merge(&self, _path: &str, _patch: Value) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        Ok(false)
    }

    async fn delete(&self, _path: &str) -> Result<bool> {
        tokio::time::sleep(self.delay).await;
        Ok(false)
    }

    async fn query(&self, _prefix: &str) -> Result<Vec<Document>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}
