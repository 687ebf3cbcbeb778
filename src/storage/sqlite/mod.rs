use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, warn};

use super::{Document, DocumentStore, EventLog};
use crate::{RagError, Result};

#[cfg(test)]
mod tests;

pub type DbPool = Pool<Sqlite>;

const DATABASE_FILE: &str = "rag.db";

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

fn unavailable(operation: &'static str) -> impl Fn(sqlx::Error) -> RagError {
    move |e| RagError::StorageUnavailable(format!("{}: {}", operation, e))
}

impl SqliteStore {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .map_err(unavailable("Failed to create database connection pool"))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    /// Open a private in-memory database; a single connection keeps it alive
    #[inline]
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(unavailable("Failed to open in-memory database"))?;

        let store = Self { pool };
        store.run_migrations().await?;

        Ok(store)
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(config_dir)
            .with_context(|| {
                format!(
                    "Failed to create config directory: {}",
                    config_dir.display()
                )
            })
            .map_err(RagError::Other)?;

        Self::new(config_dir.join(DATABASE_FILE)).await
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/storage/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| {
                RagError::StorageUnavailable(format!("Failed to run schema migration: {}", e))
            })?;

        debug!("Database migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    #[inline]
    async fn get(&self, path: &str) -> Result<Option<Value>> {
        let body = sqlx::query_scalar::<_, String>("SELECT body FROM documents WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable("Failed to read document"))?;

        body.map(|body| {
            serde_json::from_str(&body).map_err(|e| {
                RagError::Other(anyhow::anyhow!("Corrupt document body at {}: {}", path, e))
            })
        })
        .transpose()
    }

    #[inline]
    async fn set(&self, path: &str, body: Value) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO documents (path, body, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at
            "#,
        )
        .bind(path)
        .bind(body.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unavailable("Failed to write document"))?;

        Ok(())
    }

    #[inline]
    async fn create(&self, path: &str, body: Value) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            "INSERT INTO documents (path, body, updated_at) VALUES (?, ?, ?) ON CONFLICT(path) DO NOTHING",
        )
        .bind(path)
        .bind(body.to_string())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(unavailable("Failed to create document"))?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    async fn merge(&self, path: &str, patch: Value) -> Result<bool> {
        let now = Utc::now().timestamp_millis();
        let result = sqlx::query(
            "UPDATE documents SET body = json_patch(body, ?), updated_at = ? WHERE path = ?",
        )
        .bind(patch.to_string())
        .bind(now)
        .bind(path)
        .execute(&self.pool)
        .await
        .map_err(unavailable("Failed to patch document"))?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    async fn delete(&self, path: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE path = ?")
            .bind(path)
            .execute(&self.pool)
            .await
            .map_err(unavailable("Failed to delete document"))?;

        Ok(result.rows_affected() > 0)
    }

    #[inline]
    async fn query(&self, prefix: &str) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT path, body FROM documents WHERE substr(path, 1, ?) = ? ORDER BY path",
        )
        .bind(prefix.chars().count() as i64)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable("Failed to query documents"))?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let path: String = row.get("path");
            let body: String = row.get("body");
            match serde_json::from_str(&body) {
                Ok(body) => documents.push(Document { path, body }),
                Err(e) => warn!("Skipping corrupt document at {}: {}", path, e),
            }
        }

        Ok(documents)
    }
}

#[async_trait]
impl EventLog for SqliteStore {
    #[inline]
    async fn record(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO rate_limit_events (user_id, occurred_at) VALUES (?, ?)")
            .bind(user_id)
            .bind(at.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(unavailable("Failed to record rate limit event"))?;

        Ok(())
    }

    #[inline]
    async fn count_since(&self, user_id: Option<&str>, since: DateTime<Utc>) -> Result<u64> {
        let since = since.timestamp_millis();
        let count: i64 = match user_id {
            Some(user_id) => sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM rate_limit_events WHERE user_id = ? AND occurred_at >= ?",
            )
            .bind(user_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await,
            None => sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM rate_limit_events WHERE occurred_at >= ?",
            )
            .bind(since)
            .fetch_one(&self.pool)
            .await,
        }
        .map_err(unavailable("Failed to count rate limit events"))?;

        Ok(count.max(0) as u64)
    }

    #[inline]
    async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limit_events WHERE occurred_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_err(unavailable("Failed to prune rate limit events"))?;

        Ok(result.rows_affected())
    }
}
