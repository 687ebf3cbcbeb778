// Shared wiring for unit tests: in-memory storage, manual clock and an admin identity

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::clock::{Clock, ManualClock};
use crate::config::store::CONFIG_PATH;
use crate::config::{ConfigStore, SystemConfig};
use crate::embeddings::{EmbeddingProvider, EmbeddingService};
use crate::rate_limit::RateLimiter;
use crate::storage::vectors::{DEFAULT_PERFORMANCE_SCORE, text_digest};
use crate::storage::{
    BoundedStore, DocumentStore, EmbeddingVector, MemoryStore, StoragePolicy, VectorRepository,
};

pub const ADMIN: &str = "admin-uid";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
}

pub struct Harness {
    pub backend: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub store: BoundedStore,
    pub config: Arc<ConfigStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub vectors: VectorRepository,
}

impl Harness {
    pub fn new() -> Self {
        let backend = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = BoundedStore::new(backend.clone(), StoragePolicy::default());
        let config = Arc::new(ConfigStore::new(store.clone(), clock.clone(), ADMIN));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.clone(),
            backend.clone(),
            store.clone(),
            clock.clone(),
        ));
        let vectors = VectorRepository::new(store.clone());

        Self {
            backend,
            clock,
            store,
            config,
            rate_limiter,
            vectors,
        }
    }

    /// Apply `change` to the stored system config as the admin
    pub async fn configure(&self, change: impl FnOnce(&mut SystemConfig)) -> SystemConfig {
        let mut config = self.config.load_config().await;
        change(&mut config);
        self.config
            .update_config(config, ADMIN)
            .await
            .expect("test config should be valid")
    }

    /// Write a config document straight to storage, as an older or external writer might
    pub async fn write_unchecked_config(&self, change: impl FnOnce(&mut SystemConfig)) {
        let mut config = self.config.load_config().await;
        change(&mut config);
        let document = serde_json::to_value(&config).expect("config should serialize");
        self.backend
            .set(CONFIG_PATH, document)
            .await
            .expect("memory store write should succeed");
        self.config.invalidate();
    }

    pub fn embedding_service(&self, provider: Arc<dyn EmbeddingProvider>) -> EmbeddingService {
        EmbeddingService::new(
            provider,
            self.vectors.clone(),
            self.rate_limiter.clone(),
            self.config.clone(),
            self.clock.clone(),
        )
    }

    /// Store a vector directly, bypassing the provider and rate limiter
    pub async fn seed_vector(
        &self,
        user_id: &str,
        content_type: &str,
        content_id: &str,
        text: &str,
        vector: Vec<f32>,
    ) -> EmbeddingVector {
        let record = EmbeddingVector {
            id: format!("vec-{}", content_id),
            user_id: user_id.to_string(),
            content_id: content_id.to_string(),
            content_type: content_type.to_string(),
            source_text: text.to_string(),
            text_digest: text_digest(text),
            vector,
            model: "test-model".to_string(),
            created_at: self.clock.now(),
            performance_score: DEFAULT_PERFORMANCE_SCORE,
            last_used_at: None,
            usage_count: 0,
        };
        self.vectors
            .upsert(&record)
            .await
            .expect("seeding a vector should succeed");
        record
    }
}
