#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::storage::StoragePolicy;

const APP_DIR_NAME: &str = "rag-engine";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Process-level settings read from `config.toml`
///
/// The tunable policy values (limits, thresholds, TTLs) are not here; they live
/// in the document store as [`SystemConfig`](super::SystemConfig) so that admins
/// can change them at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub policy: PolicySettings,
    #[serde(default)]
    pub experiment: ExperimentSettings,
    #[serde(default)]
    pub admin: AdminSettings,
    #[serde(default)]
    pub maintenance: MaintenanceSettings,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub timeout_ms: u64,
    pub read_attempts: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            timeout_ms: 5000,
            read_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    /// Deterministic local embeddings, no network
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Ollama,
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicySettings {
    /// Content delta above which edited text is re-embedded
    pub re_vectorize_delta: f64,
    /// 0 disables config caching
    pub config_cache_ttl_secs: u64,
    pub context_cache_capacity: usize,
    pub feedback_learning_rate: f32,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            re_vectorize_delta: 0.1,
            config_cache_ttl_secs: 30,
            context_cache_capacity: 1024,
            feedback_learning_rate: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExperimentSettings {
    pub test_name: String,
}

impl Default for ExperimentSettings {
    fn default() -> Self {
        Self {
            test_name: "rag_enhancement".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AdminSettings {
    /// The only identity allowed to change system configuration; empty means nobody
    pub identity: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaintenanceSettings {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 6 * 60 * 60,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid provider timeout: {0} (must be between 1 and 300 seconds)")]
    InvalidProviderTimeout(u64),
    #[error("Invalid storage timeout: {0} (must be between 1 and 60000 milliseconds)")]
    InvalidStorageTimeout(u64),
    #[error("Invalid read attempts: {0} (must be between 1 and 10)")]
    InvalidReadAttempts(u32),
    #[error("Invalid re-vectorize delta: {0} (must be at least 0 and below 1)")]
    InvalidReVectorizeDelta(f64),
    #[error("Invalid config cache TTL: {0} (must be at most 3600 seconds)")]
    InvalidConfigCacheTtl(u64),
    #[error("Invalid context cache capacity: {0} (must be between 1 and 100000)")]
    InvalidCacheCapacity(usize),
    #[error("Invalid feedback learning rate: {0} (must be above 0 and at most 1)")]
    InvalidLearningRate(f32),
    #[error("Invalid sweep interval: {0} (must be at least 60 seconds)")]
    InvalidSweepInterval(u64),
    #[error("Invalid test name: '{0}' (cannot be empty)")]
    InvalidTestName(String),
    #[error("Invalid ragPercentage: {0} (must be between 0 and 100)")]
    InvalidRagPercentage(u32),
    #[error("Invalid endDate: test must end after it starts")]
    InvalidTestWindow,
    #[error("Invalid rating: {0} (must be between 1 and 5)")]
    InvalidRating(u8),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid {field}: must be a positive integer while the feature is enabled")]
    NotPositive { field: &'static str },
    #[error("Invalid {field}: {value} (must be at most {max})")]
    AboveMaximum {
        field: &'static str,
        value: u64,
        max: u64,
    },
    #[error("Invalid {field}: {value} (must be between 0 and 1)")]
    OutOfUnitRange { field: &'static str, value: f64 },
    #[error("Invalid {field}: {user} exceeds the global limit of {global}")]
    UserLimitExceedsGlobal {
        field: &'static str,
        user: u32,
        global: u32,
    },
    #[error("Invalid embedding.model: '{0}' (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding.dimensions: {0} (must be between 1 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid embedding.costPer1K: {0} (must be a non-negative number)")]
    InvalidCost(f64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Settings {
    /// Default settings directory, e.g. `~/.config/rag-engine`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        settings.base_dir = config_dir.as_ref().to_path_buf();

        settings
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(settings)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content =
            toml::to_string_pretty(self).context("Failed to serialize settings to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.storage.validate()?;
        self.provider.validate()?;
        self.policy.validate()?;

        if self.experiment.test_name.trim().is_empty() {
            return Err(ConfigError::InvalidTestName(
                self.experiment.test_name.clone(),
            ));
        }

        if self.maintenance.sweep_interval_secs < 60 {
            return Err(ConfigError::InvalidSweepInterval(
                self.maintenance.sweep_interval_secs,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Get the path for the SQLite database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("rag.db")
    }

    #[inline]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance.sweep_interval_secs)
    }
}

impl ServerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        Ok(())
    }

    #[inline]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl StorageSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=60_000).contains(&self.timeout_ms) {
            return Err(ConfigError::InvalidStorageTimeout(self.timeout_ms));
        }

        if !(1..=10).contains(&self.read_attempts) {
            return Err(ConfigError::InvalidReadAttempts(self.read_attempts));
        }

        Ok(())
    }

    #[inline]
    pub fn policy(&self) -> StoragePolicy {
        StoragePolicy {
            timeout: Duration::from_millis(self.timeout_ms),
            read_attempts: self.read_attempts,
            ..StoragePolicy::default()
        }
    }
}

impl ProviderSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if !(1..=300).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidProviderTimeout(self.timeout_secs));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn set_protocol(&mut self, protocol: String) -> Result<(), ConfigError> {
        if protocol != "http" && protocol != "https" {
            return Err(ConfigError::InvalidProtocol(protocol));
        }
        self.protocol = protocol;
        Ok(())
    }

    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let temp_config = ProviderSettings {
            host: host.clone(),
            ..self.clone()
        };
        temp_config.validate()?;
        self.host = host;
        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }
}

impl PolicySettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.re_vectorize_delta.is_finite() || !(0.0..1.0).contains(&self.re_vectorize_delta) {
            return Err(ConfigError::InvalidReVectorizeDelta(
                self.re_vectorize_delta,
            ));
        }

        if self.config_cache_ttl_secs > 3600 {
            return Err(ConfigError::InvalidConfigCacheTtl(
                self.config_cache_ttl_secs,
            ));
        }

        if !(1..=100_000).contains(&self.context_cache_capacity) {
            return Err(ConfigError::InvalidCacheCapacity(
                self.context_cache_capacity,
            ));
        }

        if !self.feedback_learning_rate.is_finite()
            || self.feedback_learning_rate <= 0.0
            || self.feedback_learning_rate > 1.0
        {
            return Err(ConfigError::InvalidLearningRate(
                self.feedback_learning_rate,
            ));
        }

        Ok(())
    }
}
