
use anyhow::{Context, Result};
use async_trait::async_trait;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use super::EmbeddingProvider;
use crate::RagError;
use crate::config::ProviderSettings;
use crate::storage::{StoragePolicy, read_with_retry};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const MODEL_LIST_OPERATION: &str = "ollama /api/tags";

/// Ollama HTTP client; embeddings get one attempt, model listing is retried
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    agent: ureq::Agent,
    metadata_retry: StoragePolicy,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

fn metadata_policy(timeout: Duration) -> StoragePolicy {
    StoragePolicy {
        timeout,
        read_attempts: 3,
        retry_backoff: Duration::from_millis(250),
    }
}

/// Server errors and transport failures are worth another try; anything else is final
fn classify(error: ureq::Error, what: &str) -> RagError {
    match error {
        ureq::Error::StatusCode(status) if status >= 500 => {
            RagError::ProviderUnavailable(format!("{} answered HTTP {}", what, status))
        }
        ureq::Error::StatusCode(status) => {
            RagError::Provider(format!("{} rejected with HTTP {}", what, status))
        }
        e @ (ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound
        | ureq::Error::Timeout(_)
        | ureq::Error::Io(_)) => RagError::ProviderUnavailable(format!("{}: {}", what, e)),
        e => RagError::Provider(format!("{}: {}", what, e)),
    }
}

impl OllamaClient {
    #[inline]
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let base_url = settings
            .ollama_url()
            .context("Failed to generate Ollama URL from settings")?;

        Ok(Self::with_base_url(base_url).with_timeout(settings.timeout()))
    }

    /// Client for an explicit base URL, e.g. a mock server
    #[inline]
    pub fn with_base_url(base_url: Url) -> Self {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECONDS);
        Self {
            base_url,
            agent: build_agent(timeout),
            metadata_retry: metadata_policy(timeout),
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self.metadata_retry.timeout = timeout;
        self
    }

    #[inline]
    pub fn with_metadata_retry(mut self, policy: StoragePolicy) -> Self {
        self.metadata_retry = policy;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Models the server has pulled
    #[inline]
    pub async fn list_models(&self) -> crate::Result<Vec<ModelInfo>> {
        read_with_retry(&self.metadata_retry, MODEL_LIST_OPERATION, || {
            let client = self.clone();
            async move {
                tokio::task::spawn_blocking(move || client.fetch_models())
                    .await
                    .map_err(|e| RagError::Provider(format!("Model listing task failed: {}", e)))?
            }
        })
        .await
    }

    /// Fail unless the server is reachable and serves `model`
    #[inline]
    pub async fn check_model(&self, model: &str) -> crate::Result<()> {
        let models = self.list_models().await?;

        if models.iter().any(|m| m.name == model) {
            info!("Ollama at {} serves {}", self.base_url, model);
            return Ok(());
        }

        Err(RagError::Provider(format!(
            "model '{}' is not served by {} (available: {})",
            model,
            self.base_url,
            models.iter().map(|m| m.name.as_str()).join(", ")
        )))
    }

    fn fetch_models(&self) -> crate::Result<Vec<ModelInfo>> {
        let url = self
            .base_url
            .join("/api/tags")
            .map_err(|e| RagError::Provider(format!("Bad model list URL: {}", e)))?;

        let body = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| classify(e, "Model listing"))?;

        let tags: TagsResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Provider(format!("Unreadable model list: {}", e)))?;
        debug!("Ollama lists {} models", tags.models.len());
        Ok(tags.models)
    }

    fn embed_blocking(&self, text: &str, model: &str) -> crate::Result<Vec<f32>> {
        let url = self
            .base_url
            .join("/api/embed")
            .map_err(|e| RagError::Provider(format!("Bad embedding URL: {}", e)))?;
        let request = serde_json::to_string(&EmbedRequest { model, input: text })
            .map_err(|e| RagError::Provider(format!("Unencodable embedding request: {}", e)))?;

        let body = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&request)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| match classify(e, "Embedding request") {
                RagError::ProviderUnavailable(msg) => RagError::Provider(msg),
                other => other,
            })?;

        let response: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Provider(format!("Unreadable embedding response: {}", e)))?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Provider("Embedding response contained no vectors".into()))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn embed(&self, text: &str, model: &str, _dimensions: u32) -> crate::Result<Vec<f32>> {
        debug!("Embedding {} chars with {}", text.len(), model);
        let client = self.clone();
        let text = text.to_string();
        let model = model.to_string();

        tokio::task::spawn_blocking(move || client.embed_blocking(&text, &model))
            .await
            .map_err(|e| RagError::Provider(format!("Embedding task failed: {}", e)))?
    }
}
