// Configuration module
// Process settings come from TOML; the runtime-tunable SystemConfig lives in the document store

pub mod settings;
pub mod store;
pub mod system;

pub use settings::{
    AdminSettings, ConfigError, ExperimentSettings, MaintenanceSettings, PolicySettings,
    ProviderKind, ProviderSettings, ServerSettings, Settings, StorageBackend, StorageSettings,
};
pub use store::ConfigStore;
pub use system::{
    EmbeddingConfig, LegacyRateLimits, PerformanceConfig, RateLimitingConfig, SystemConfig,
    VectorCleanupConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Settings::default_dir()
}
