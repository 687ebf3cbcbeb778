// Scriptable embedding provider

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::{EmbeddingProvider, HashingProvider};
use crate::{RagError, Result};

/// Returns canned vectors per text, otherwise a hashed projection
#[derive(Debug, Default)]
pub struct StubProvider {
    vectors: HashMap<String, Vec<f32>>,
    fixed_len: Option<usize>,
    fail: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vector(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// Ignore the requested dimensions and always answer with `len` values
    pub fn with_fixed_len(mut self, len: usize) -> Self {
        self.fixed_len = Some(len);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn stalled(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn embed(&self, text: &str, _model: &str, dimensions: u32) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(RagError::Provider("stub provider failure".to_string()));
        }
        if let Some(vector) = self.vectors.get(text) {
            return Ok(vector.clone());
        }

        let len = self.fixed_len.unwrap_or(dimensions as usize);
        Ok(HashingProvider::project(text, len))
    }
}
