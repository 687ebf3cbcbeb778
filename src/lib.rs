use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Validation error: {0}")]
    Validation(#[from] ConfigError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Whether the error came from an unreachable or slow backend rather than bad input
    #[inline]
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::ProviderUnavailable(_) | Self::Timeout(_)
        )
    }
}

pub mod api;
pub mod brand;
pub mod cache;
pub mod cleanup;
pub mod clock;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod experiment;
pub mod feedback;
pub mod rate_limit;
pub mod retrieval;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;
