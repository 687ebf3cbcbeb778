// System configuration persistence
// Defaults are merged on read; admin writes are validated, versioned and mirrored


use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::system::{LegacyRateLimits, SystemConfig};
use crate::cache::TtlCache;
use crate::clock::Clock;
use crate::storage::BoundedStore;
use crate::{RagError, Result};

pub const CONFIG_PATH: &str = "system_config/current";
pub const LEGACY_RATE_LIMITS_PATH: &str = "admin/rateLimits";

/// Reject `actor` unless it is the configured admin identity
///
/// An empty admin identity authorizes nobody.
#[inline]
pub fn authorize_admin(admin_identity: &str, actor: &str) -> Result<()> {
    if admin_identity.is_empty() || actor != admin_identity {
        return Err(RagError::Unauthorized(format!(
            "'{}' is not allowed to change system configuration",
            actor
        )));
    }
    Ok(())
}

/// Remove `null` members recursively so they fall back to defaults when deserialized
#[inline]
pub fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(fields) => {
            fields.retain(|_, field| !field.is_null());
            fields.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

fn decode_config(mut body: Value) -> Result<SystemConfig> {
    strip_nulls(&mut body);
    serde_json::from_value(body)
        .map_err(|e| RagError::Other(anyhow::anyhow!("Malformed system config: {}", e)))
}

#[derive(Debug)]
pub struct ConfigStore {
    store: BoundedStore,
    clock: Arc<dyn Clock>,
    admin_identity: String,
    cache: TtlCache<&'static str, SystemConfig>,
    cache_ttl: chrono::Duration,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    #[inline]
    pub fn new(store: BoundedStore, clock: Arc<dyn Clock>, admin_identity: impl Into<String>) -> Self {
        Self {
            store,
            cache: TtlCache::new(1, Arc::clone(&clock)),
            clock,
            admin_identity: admin_identity.into(),
            cache_ttl: chrono::Duration::zero(),
            write_lock: Mutex::new(()),
        }
    }

    /// Keep loaded configs for `ttl`; zero disables caching
    #[inline]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        self
    }

    #[inline]
    pub fn admin_identity(&self) -> &str {
        &self.admin_identity
    }

    #[inline]
    pub fn authorize(&self, actor: &str) -> Result<()> {
        authorize_admin(&self.admin_identity, actor)
    }

    /// Current config merged over defaults; never fails
    ///
    /// Storage errors, timeouts and malformed documents all yield the defaults.
    #[inline]
    pub async fn load_config(&self) -> SystemConfig {
        match self.try_load_config().await {
            Ok(config) => config,
            Err(e) => {
                warn!("Using default system config: {}", e);
                SystemConfig::default()
            }
        }
    }

    /// Like [`load_config`](Self::load_config) but reports why the stored document could not be used
    #[inline]
    pub async fn try_load_config(&self) -> Result<SystemConfig> {
        if let Some(config) = self.cache.get(&CONFIG_PATH) {
            return Ok(config);
        }

        let config = match self.store.get(CONFIG_PATH).await? {
            Some(body) => decode_config(body)?,
            None => self.create_defaults().await,
        };

        self.cache.insert(CONFIG_PATH, config.clone(), self.cache_ttl);
        Ok(config)
    }

    async fn create_defaults(&self) -> SystemConfig {
        let defaults = SystemConfig {
            last_updated: self.clock.now(),
            ..SystemConfig::default()
        };

        match self.store.create_as(CONFIG_PATH, &defaults).await {
            Ok(true) => info!("Created default system config"),
            Ok(false) => debug!("System config was created concurrently"),
            Err(e) => warn!("Could not persist default system config: {}", e),
        }

        defaults
    }

    /// Validate and persist `new_config` as the next version
    ///
    /// Returns the stored document. Nothing is written when authorization or
    /// validation fails.
    #[inline]
    pub async fn update_config(&self, new_config: SystemConfig, actor: &str) -> Result<SystemConfig> {
        self.authorize(actor)?;
        new_config.validate()?;

        let _guard = self.write_lock.lock().await;

        let current_version = self
            .store
            .get(CONFIG_PATH)
            .await?
            .and_then(|body| body.get("version").and_then(Value::as_u64))
            .unwrap_or(SystemConfig::default().version);

        let persisted = SystemConfig {
            last_updated: self.clock.now(),
            updated_by: actor.to_string(),
            version: current_version + 1,
            ..new_config
        };

        self.store.set_as(CONFIG_PATH, &persisted).await?;
        self.cache
            .insert(CONFIG_PATH, persisted.clone(), self.cache_ttl);

        info!(
            "System config updated to version {} by {}",
            persisted.version, actor
        );

        self.store
            .set_as(LEGACY_RATE_LIMITS_PATH, &persisted.legacy_rate_limits())
            .await
            .map_err(|e| {
                warn!("Failed to mirror rate limits to {}: {}", LEGACY_RATE_LIMITS_PATH, e);
                RagError::StorageUnavailable(format!(
                    "config version {} saved but legacy rate limits not mirrored: {}",
                    persisted.version, e
                ))
            })?;

        Ok(persisted)
    }

    /// The mirrored rate-limit record read by older consumers
    #[inline]
    pub async fn legacy_rate_limits(&self) -> Result<Option<LegacyRateLimits>> {
        self.store.get_as(LEGACY_RATE_LIMITS_PATH).await
    }

    /// Drop the cached config so the next read goes to storage
    #[inline]
    pub fn invalidate(&self) {
        self.cache.remove(&CONFIG_PATH);
    }
}
