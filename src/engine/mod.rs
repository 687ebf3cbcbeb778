// Engine facade
// Wires every RAG component over one set of backends


use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::brand::BrandVectorizer;
use crate::cleanup::{MaintenanceTask, VectorCleanup};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigStore, ProviderKind, Settings, StorageBackend};
use crate::embeddings::{CosineScorer, EmbeddingProvider, EmbeddingService, HashingProvider, OllamaClient};
use crate::experiment::{AbAssignment, TestGroup};
use crate::feedback::FeedbackService;
use crate::rate_limit::RateLimiter;
use crate::retrieval::{ContextBundle, ContextRetriever, RetrievalOptions};
use crate::storage::{BoundedStore, DocumentStore, EventLog, MemoryStore, SqliteStore, VectorRepository};
use crate::{RagError, Result};

/// Content type assumed when a request does not name one
pub const DEFAULT_CONTENT_TYPE: &str = "general";

/// Storage and provider implementations the engine runs on
#[derive(Clone)]
pub struct Backends {
    pub documents: Arc<dyn DocumentStore>,
    pub events: Arc<dyn EventLog>,
    pub provider: Arc<dyn EmbeddingProvider>,
}

impl fmt::Debug for Backends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backends")
            .field("provider", &self.provider.name())
            .finish_non_exhaustive()
    }
}

impl Backends {
    /// Memory-backed storage around `provider`
    #[inline]
    pub fn in_memory(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            documents: store.clone(),
            events: store,
            provider,
        }
    }

    /// Backends selected by `settings`
    #[inline]
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> = match settings.provider.kind {
            ProviderKind::Ollama => Arc::new(
                OllamaClient::new(&settings.provider)
                    .map_err(|e| RagError::Settings(format!("{:#}", e)))?,
            ),
            ProviderKind::Hashing => Arc::new(HashingProvider::new()),
        };

        match settings.storage.backend {
            StorageBackend::Sqlite => {
                let store = Arc::new(SqliteStore::initialize_from_config_dir(settings.get_base_dir()).await?);
                info!(
                    "Using SQLite storage at {}",
                    settings.database_path().display()
                );
                Ok(Self {
                    documents: store.clone(),
                    events: store,
                    provider,
                })
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage; nothing will persist");
                Ok(Self::in_memory(provider))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRequest {
    pub user_id: String,
    pub query: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Whether to ground a generation request, and with what
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RagEnhancement {
    #[serde(rename = "useRAG")]
    pub use_rag: bool,
    pub test_group: TestGroup,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextBundle>,
}

#[derive(Debug)]
pub struct RagEngine {
    settings: Settings,
    clock: Arc<dyn Clock>,
    config: Arc<ConfigStore>,
    vectors: VectorRepository,
    rate_limiter: Arc<RateLimiter>,
    embeddings: Arc<EmbeddingService>,
    retriever: Arc<ContextRetriever>,
    assignment: Arc<AbAssignment>,
    cleanup: Arc<VectorCleanup>,
    feedback: Arc<FeedbackService>,
    brand: BrandVectorizer,
}

impl RagEngine {
    #[inline]
    pub fn new(settings: Settings, backends: Backends, clock: Arc<dyn Clock>) -> Self {
        let store = BoundedStore::new(backends.documents, settings.storage.policy());
        let vectors = VectorRepository::new(store.clone());

        let config = Arc::new(
            ConfigStore::new(store.clone(), clock.clone(), settings.admin.identity.clone())
                .with_cache_ttl(std::time::Duration::from_secs(
                    settings.policy.config_cache_ttl_secs,
                )),
        );

        let rate_limiter = Arc::new(RateLimiter::new(
            config.clone(),
            backends.events,
            store.clone(),
            clock.clone(),
        ));

        let embeddings = Arc::new(
            EmbeddingService::new(
                backends.provider,
                vectors.clone(),
                rate_limiter.clone(),
                config.clone(),
                clock.clone(),
            )
            .with_re_vectorize_delta(settings.policy.re_vectorize_delta)
            .with_provider_timeout(settings.provider.timeout()),
        );

        let retriever = Arc::new(
            ContextRetriever::new(
                vectors.clone(),
                embeddings.clone(),
                Arc::new(CosineScorer),
                config.clone(),
                clock.clone(),
            )
            .with_cache_capacity(settings.policy.context_cache_capacity),
        );

        let assignment = Arc::new(AbAssignment::new(
            store.clone(),
            config.clone(),
            clock.clone(),
            settings.experiment.test_name.clone(),
        ));

        let cleanup = Arc::new(VectorCleanup::new(
            vectors.clone(),
            config.clone(),
            clock.clone(),
        ));

        let feedback = Arc::new(
            FeedbackService::new(store, vectors.clone(), clock.clone())
                .with_learning_rate(settings.policy.feedback_learning_rate),
        );

        let brand = BrandVectorizer::new(embeddings.clone());

        Self {
            settings,
            clock,
            config,
            vectors,
            rate_limiter,
            embeddings,
            retriever,
            assignment,
            cleanup,
            feedback,
            brand,
        }
    }

    /// Engine on the backends named in `settings`, using the system clock
    #[inline]
    pub async fn open(settings: Settings) -> Result<Self> {
        let backends = Backends::from_settings(&settings).await?;
        Ok(Self::new(settings, backends, Arc::new(SystemClock)))
    }

    /// Decide RAG eligibility for a generation request and fetch context when eligible
    #[inline]
    pub async fn enhance(&self, request: &RagRequest) -> RagEnhancement {
        let content_type = request
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_TYPE);

        let decision = self
            .assignment
            .should_enhance_with_rag(&request.user_id, content_type)
            .await;

        if !decision.use_rag {
            debug!("{} is in the baseline group: {}", request.user_id, decision.reason);
            return RagEnhancement {
                use_rag: false,
                test_group: decision.test_group,
                reason: decision.reason,
                context: None,
            };
        }

        let mut options = RetrievalOptions::new(request.user_id.clone());
        options.content_type = request.content_type.clone();
        if let Some(limit) = request.limit {
            options.limit = limit;
        }

        let context = self
            .retriever
            .retrieve_relevant_context(&request.query, &options)
            .await;

        RagEnhancement {
            use_rag: true,
            test_group: decision.test_group,
            reason: decision.reason,
            context: Some(context),
        }
    }

    /// Periodic maintenance configured from settings
    #[inline]
    pub fn maintenance_task(&self) -> MaintenanceTask {
        MaintenanceTask::new(
            self.cleanup.clone(),
            self.rate_limiter.clone(),
            self.settings.sweep_interval(),
        )
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    #[inline]
    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    #[inline]
    pub fn vectors(&self) -> &VectorRepository {
        &self.vectors
    }

    #[inline]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    #[inline]
    pub fn embeddings(&self) -> &EmbeddingService {
        &self.embeddings
    }

    #[inline]
    pub fn retriever(&self) -> &ContextRetriever {
        &self.retriever
    }

    #[inline]
    pub fn assignment(&self) -> &AbAssignment {
        &self.assignment
    }

    #[inline]
    pub fn cleanup(&self) -> &VectorCleanup {
        &self.cleanup
    }

    #[inline]
    pub fn feedback(&self) -> &FeedbackService {
        &self.feedback
    }

    #[inline]
    pub fn brand(&self) -> &BrandVectorizer {
        &self.brand
    }
}
