use super::*;
use chrono::Duration;
use serde_json::json;
use std::collections::HashSet;
use tempfile::TempDir;

async fn create_test_store() -> Result<(TempDir, SqliteStore)> {
    let temp_dir = TempDir::new()?;
    let store = SqliteStore::initialize_from_config_dir(temp_dir.path()).await?;
    Ok((temp_dir, store))
}

#[tokio::test]
async fn integration_schema_migration() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%'",
    )
    .fetch_all(store.pool())
    .await
    .map_err(|e| RagError::StorageUnavailable(e.to_string()))?;

    let expected_tables: HashSet<&'static str> =
        ["documents", "rate_limit_events"].into_iter().collect();

    let actual_tables: HashSet<&str> = tables.iter().map(|t| t.as_str()).collect();
    assert_eq!(actual_tables, expected_tables);

    Ok(())
}

#[tokio::test]
async fn document_crud_operations() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;

    assert_eq!(store.get("system_config/current").await?, None);

    store
        .set("system_config/current", json!({"version": 1, "updatedBy": "system"}))
        .await?;
    assert_eq!(
        store.get("system_config/current").await?,
        Some(json!({"version": 1, "updatedBy": "system"}))
    );

    // Overwrite replaces the whole document
    store
        .set("system_config/current", json!({"version": 2}))
        .await?;
    assert_eq!(
        store.get("system_config/current").await?,
        Some(json!({"version": 2}))
    );

    assert!(store.delete("system_config/current").await?);
    assert!(!store.delete("system_config/current").await?);
    assert_eq!(store.get("system_config/current").await?, None);

    Ok(())
}

#[tokio::test]
async fn merge_only_touches_existing_documents() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;

    assert!(!store.merge("embeddings/u1/logo/x", json!({"usageCount": 1})).await?);
    assert_eq!(store.get("embeddings/u1/logo/x").await?, None);

    store
        .set("embeddings/u1/logo/x", json!({"id": "x", "usageCount": 0, "sourceText": "a"}))
        .await?;
    assert!(store.merge("embeddings/u1/logo/x", json!({"usageCount": 3})).await?);

    assert_eq!(
        store.get("embeddings/u1/logo/x").await?,
        Some(json!({"id": "x", "usageCount": 3, "sourceText": "a"}))
    );

    Ok(())
}

#[tokio::test]
async fn query_matches_prefix_only() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;

    store.set("embeddings/al/post/1", json!({"n": 1})).await?;
    store.set("embeddings/alice/post/2", json!({"n": 2})).await?;
    store.set("embeddings/alice/post/3", json!({"n": 3})).await?;
    store.set("feedback/alice/1", json!({"n": 4})).await?;

    let alice = store.query("embeddings/alice/").await?;
    let paths: Vec<&str> = alice.iter().map(|d| d.path.as_str()).collect();
    assert_eq!(paths, vec!["embeddings/alice/post/2", "embeddings/alice/post/3"]);

    let all = store.query("embeddings/").await?;
    assert_eq!(all.len(), 3);

    Ok(())
}

#[tokio::test]
async fn event_log_counts_rolling_windows() -> Result<()> {
    let store = SqliteStore::in_memory().await?;
    let now = Utc::now();

    store.record("alice", now - Duration::minutes(90)).await?;
    store.record("alice", now - Duration::minutes(30)).await?;
    store.record("alice", now - Duration::minutes(5)).await?;
    store.record("bob", now - Duration::minutes(10)).await?;

    let hour_ago = now - Duration::hours(1);
    assert_eq!(store.count_since(Some("alice"), hour_ago).await?, 2);
    assert_eq!(store.count_since(Some("bob"), hour_ago).await?, 1);
    assert_eq!(store.count_since(None, hour_ago).await?, 3);
    assert_eq!(store.count_since(None, now - Duration::days(1)).await?, 4);
    assert_eq!(store.count_since(Some("carol"), hour_ago).await?, 0);

    let pruned = store.prune_before(now - Duration::hours(1)).await?;
    assert_eq!(pruned, 1);
    assert_eq!(store.count_since(None, now - Duration::days(1)).await?, 3);

    Ok(())
}

#[tokio::test]
async fn create_only_writes_missing_documents() -> Result<()> {
    let (_temp_dir, store) = create_test_store().await?;

    assert!(store.create("system_config/current", json!({"version": 1})).await?);
    assert!(!store.create("system_config/current", json!({"version": 9})).await?);
    assert_eq!(
        store.get("system_config/current").await?,
        Some(json!({"version": 1}))
    );

    Ok(())
}
