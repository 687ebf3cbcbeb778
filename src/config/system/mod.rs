
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ConfigError;

pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text:latest";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;
pub const MAX_RETENTION_DAYS: u32 = 36_500;
pub const MAX_CACHE_TTL_SECS: u64 = 31_536_000;

/// System-wide tunables shared by every RAG component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemConfig {
    pub rate_limiting: RateLimitingConfig,
    pub vector_cleanup: VectorCleanupConfig,
    pub embedding: EmbeddingConfig,
    pub performance: PerformanceConfig,
    pub last_updated: DateTime<Utc>,
    pub updated_by: String,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimitingConfig {
    pub enabled: bool,
    pub global_max_per_hour: u32,
    pub global_max_per_day: u32,
    pub user_max_per_hour: u32,
    pub user_max_per_day: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VectorCleanupConfig {
    pub enabled: bool,
    pub retention_days: u32,
    pub min_performance_threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: u32,
    #[serde(rename = "costPer1K")]
    pub cost_per_1k: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PerformanceConfig {
    pub similarity_threshold: f32,
    pub max_context_length: u32,
    pub cache_enabled: bool,
    #[serde(rename = "cacheTTL")]
    pub cache_ttl: u64,
}

/// The rate-limiting subset mirrored for readers of the older admin record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyRateLimits {
    #[serde(flatten)]
    pub limits: RateLimitingConfig,
    pub last_updated: DateTime<Utc>,
    pub updated_by: String,
}

impl Default for SystemConfig {
    #[inline]
    fn default() -> Self {
        Self {
            rate_limiting: RateLimitingConfig::default(),
            vector_cleanup: VectorCleanupConfig::default(),
            embedding: EmbeddingConfig::default(),
            performance: PerformanceConfig::default(),
            last_updated: DateTime::<Utc>::default(),
            updated_by: "system".to_string(),
            version: 1,
        }
    }
}

impl Default for RateLimitingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            enabled: true,
            global_max_per_hour: 1000,
            global_max_per_day: 10000,
            user_max_per_hour: 50,
            user_max_per_day: 200,
        }
    }
}

impl Default for VectorCleanupConfig {
    #[inline]
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: 90,
            min_performance_threshold: 0.3,
        }
    }
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIMENSION,
            cost_per_1k: 0.0001,
        }
    }
}

impl Default for PerformanceConfig {
    #[inline]
    fn default() -> Self {
        Self {
            similarity_threshold: 0.7,
            max_context_length: 2000,
            cache_enabled: true,
            cache_ttl: 3600,
        }
    }
}

impl SystemConfig {
    /// Check every invariant, reporting the first field that fails
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limiting.validate()?;
        self.vector_cleanup.validate()?;
        self.embedding.validate()?;
        self.performance.validate()?;
        Ok(())
    }

    #[inline]
    pub fn legacy_rate_limits(&self) -> LegacyRateLimits {
        LegacyRateLimits {
            limits: self.rate_limiting.clone(),
            last_updated: self.last_updated,
            updated_by: self.updated_by.clone(),
        }
    }
}

fn require_positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::NotPositive { field });
    }
    Ok(())
}

fn require_at_most(field: &'static str, value: u64, max: u64) -> Result<(), ConfigError> {
    if value > max {
        return Err(ConfigError::AboveMaximum { field, value, max });
    }
    Ok(())
}

fn require_unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::OutOfUnitRange {
            field,
            value: f64::from(value),
        });
    }
    Ok(())
}

impl RateLimitingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }

        require_positive(
            "rateLimiting.globalMaxPerHour",
            u64::from(self.global_max_per_hour),
        )?;
        require_positive(
            "rateLimiting.globalMaxPerDay",
            u64::from(self.global_max_per_day),
        )?;
        require_positive(
            "rateLimiting.userMaxPerHour",
            u64::from(self.user_max_per_hour),
        )?;
        require_positive(
            "rateLimiting.userMaxPerDay",
            u64::from(self.user_max_per_day),
        )?;

        if self.user_max_per_hour > self.global_max_per_hour {
            return Err(ConfigError::UserLimitExceedsGlobal {
                field: "rateLimiting.userMaxPerHour",
                user: self.user_max_per_hour,
                global: self.global_max_per_hour,
            });
        }

        if self.user_max_per_day > self.global_max_per_day {
            return Err(ConfigError::UserLimitExceedsGlobal {
                field: "rateLimiting.userMaxPerDay",
                user: self.user_max_per_day,
                global: self.global_max_per_day,
            });
        }

        Ok(())
    }
}

impl VectorCleanupConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_unit_interval(
            "vectorCleanup.minPerformanceThreshold",
            self.min_performance_threshold,
        )?;

        if self.enabled {
            require_positive("vectorCleanup.retentionDays", u64::from(self.retention_days))?;
            require_at_most(
                "vectorCleanup.retentionDays",
                u64::from(self.retention_days),
                u64::from(MAX_RETENTION_DAYS),
            )?;
        }

        Ok(())
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(1..=8192).contains(&self.dimensions) {
            return Err(ConfigError::InvalidEmbeddingDimension(self.dimensions));
        }

        if !self.cost_per_1k.is_finite() || self.cost_per_1k < 0.0 {
            return Err(ConfigError::InvalidCost(self.cost_per_1k));
        }

        Ok(())
    }
}

impl PerformanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_unit_interval(
            "performance.similarityThreshold",
            self.similarity_threshold,
        )?;
        require_positive(
            "performance.maxContextLength",
            u64::from(self.max_context_length),
        )?;

        if self.cache_enabled {
            require_positive("performance.cacheTTL", self.cache_ttl)?;
            require_at_most("performance.cacheTTL", self.cache_ttl, MAX_CACHE_TTL_SECS)?;
        }

        Ok(())
    }
}
