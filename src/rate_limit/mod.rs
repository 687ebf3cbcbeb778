// Rate limiting for embedding generation
// Counts come from the event log over rolling windows; nothing is kept in process


use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{ConfigError, ConfigStore, RateLimitingConfig};
use crate::storage::{BoundedStore, EventLog, bounded, path_segment};
use crate::Result;

pub const OVERRIDES_COLLECTION: &str = "rate_limit_overrides";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitScope {
    User,
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Hour,
    Day,
}

impl WindowKind {
    #[inline]
    pub fn length(self) -> Duration {
        match self {
            Self::Hour => Duration::hours(1),
            Self::Day => Duration::hours(24),
        }
    }

    #[inline]
    pub fn adjective(self) -> &'static str {
        match self {
            Self::Hour => "hourly",
            Self::Day => "daily",
        }
    }
}

impl fmt::Display for LimitScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Global => write!(f, "global"),
        }
    }
}

/// Events counted in one rolling window against one limit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitCounter {
    pub scope: LimitScope,
    pub window_kind: WindowKind,
    pub window_start: DateTime<Utc>,
    pub count: u64,
    pub limit: u32,
}

impl RateLimitCounter {
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.count >= u64::from(self.limit)
    }

    #[inline]
    pub fn describe(&self) -> String {
        format!(
            "{} {} limit of {} reached ({} events since {})",
            self.window_kind.adjective(),
            self.scope,
            self.limit,
            self.count,
            self.window_start.to_rfc3339()
        )
    }
}

/// Outcome of [`RateLimiter::check_and_record`]; a rejection is a normal result, not an error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub counters: Vec<RateLimitCounter>,
}

impl RateLimitDecision {
    #[inline]
    pub fn allow(counters: Vec<RateLimitCounter>) -> Self {
        Self {
            allowed: true,
            reason: None,
            counters,
        }
    }

    #[inline]
    pub fn reject(reason: impl Into<String>, counters: Vec<RateLimitCounter>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            counters,
        }
    }
}

/// Per-user replacement for the configured user limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitOverride {
    pub user_id: String,
    #[serde(default)]
    pub enabled: bool,
    pub max_per_hour: u32,
    pub max_per_day: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_by: String,
}

impl RateLimitOverride {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.user_id.trim().is_empty() {
            return Err(ConfigError::MissingField("userId"));
        }
        if self.max_per_hour == 0 {
            return Err(ConfigError::NotPositive {
                field: "maxPerHour",
            });
        }
        if self.max_per_day == 0 {
            return Err(ConfigError::NotPositive { field: "maxPerDay" });
        }
        Ok(())
    }
}

pub struct RateLimiter {
    config: Arc<ConfigStore>,
    events: Arc<dyn EventLog>,
    store: BoundedStore,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    #[inline]
    pub fn new(
        config: Arc<ConfigStore>,
        events: Arc<dyn EventLog>,
        store: BoundedStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            events,
            store,
            clock,
        }
    }

    #[inline]
    pub fn override_path(user_id: &str) -> String {
        format!("{}/{}", OVERRIDES_COLLECTION, path_segment(user_id))
    }

    /// Admit or reject one embedding generation for `user_id`, recording it when admitted
    ///
    /// User limits are checked before global limits and the first exhausted one
    /// is reported. Storage failures reject the request.
    #[inline]
    pub async fn check_and_record(&self, user_id: &str) -> RateLimitDecision {
        let config = self.config.load_config().await;
        if !config.rate_limiting.enabled {
            debug!("Rate limiting disabled, allowing {}", user_id);
            return RateLimitDecision::allow(Vec::new());
        }

        let now = self.clock.now();
        let counters = match self.counters(user_id, &config.rate_limiting, now).await {
            Ok(counters) => counters,
            Err(e) => {
                warn!("Rate limiter unavailable for {}: {}", user_id, e);
                return RateLimitDecision::reject(
                    format!("rate limiter unavailable: {}", e),
                    Vec::new(),
                );
            }
        };

        if let Some(exhausted) = counters.iter().find(|counter| counter.is_exhausted()) {
            let reason = exhausted.describe();
            info!("Rate limit hit for {}: {}", user_id, reason);
            return RateLimitDecision::reject(reason, counters);
        }

        let timeout = self.store.policy().timeout;
        let recorded = bounded(
            timeout,
            "record rate limit event",
            self.events.record(user_id, now),
        )
        .await;
        if let Err(e) = recorded {
            warn!("Failed to record rate limit event for {}: {}", user_id, e);
            return RateLimitDecision::reject(
                format!("rate limiter unavailable: {}", e),
                counters,
            );
        }

        RateLimitDecision::allow(counters)
    }

    /// Current counters for `user_id` without recording anything
    #[inline]
    pub async fn usage(&self, user_id: &str) -> Result<Vec<RateLimitCounter>> {
        let config = self.config.load_config().await;
        self.counters(user_id, &config.rate_limiting, self.clock.now())
            .await
    }

    async fn counters(
        &self,
        user_id: &str,
        limits: &RateLimitingConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<RateLimitCounter>> {
        let (user_hour_limit, user_day_limit) = match self.get_override(user_id).await? {
            Some(user_override) if user_override.enabled => {
                debug!("Applying rate limit override for {}", user_id);
                (user_override.max_per_hour, user_override.max_per_day)
            }
            _ => (limits.user_max_per_hour, limits.user_max_per_day),
        };

        let slots = [
            (LimitScope::User, WindowKind::Hour, user_hour_limit),
            (LimitScope::User, WindowKind::Day, user_day_limit),
            (LimitScope::Global, WindowKind::Hour, limits.global_max_per_hour),
            (LimitScope::Global, WindowKind::Day, limits.global_max_per_day),
        ];

        let timeout = self.store.policy().timeout;
        let counts = futures::future::try_join_all(slots.iter().map(|(scope, window, _)| {
            let since = now - window.length();
            let user = match scope {
                LimitScope::User => Some(user_id),
                LimitScope::Global => None,
            };
            bounded(
                timeout,
                "count rate limit events",
                self.events.count_since(user, since),
            )
        }))
        .await?;

        Ok(slots
            .iter()
            .zip(counts)
            .map(|((scope, window_kind, limit), count)| RateLimitCounter {
                scope: *scope,
                window_kind: *window_kind,
                window_start: now - window_kind.length(),
                count,
                limit: *limit,
            })
            .collect())
    }

    #[inline]
    pub async fn get_override(&self, user_id: &str) -> Result<Option<RateLimitOverride>> {
        self.store.get_as(&Self::override_path(user_id)).await
    }

    /// Store a per-user override (admin only)
    #[inline]
    pub async fn set_override(
        &self,
        user_override: RateLimitOverride,
        actor: &str,
    ) -> Result<RateLimitOverride> {
        self.config.authorize(actor)?;
        user_override.validate()?;

        let stored = RateLimitOverride {
            updated_at: self.clock.now(),
            updated_by: actor.to_string(),
            ..user_override
        };
        self.store
            .set_as(&Self::override_path(&stored.user_id), &stored)
            .await?;

        info!(
            "Rate limit override for {} set to {}/h {}/day (enabled: {})",
            stored.user_id, stored.max_per_hour, stored.max_per_day, stored.enabled
        );
        Ok(stored)
    }

    /// Remove a per-user override (admin only); returns whether one existed
    #[inline]
    pub async fn remove_override(&self, user_id: &str, actor: &str) -> Result<bool> {
        self.config.authorize(actor)?;
        self.store.delete(&Self::override_path(user_id)).await
    }

    /// Users whose override is currently enabled
    #[inline]
    pub async fn limited_users(&self) -> Result<Vec<RateLimitOverride>> {
        let documents = self
            .store
            .query(&format!("{}/", OVERRIDES_COLLECTION))
            .await?;

        Ok(documents
            .into_iter()
            .filter_map(|document| {
                serde_json::from_value::<RateLimitOverride>(document.body)
                    .map_err(|e| warn!("Skipping malformed override at {}: {}", document.path, e))
                    .ok()
            })
            .filter(|user_override| user_override.enabled)
            .collect())
    }

    /// Delete events too old to count in any window
    #[inline]
    pub async fn prune_expired_events(&self) -> Result<u64> {
        let cutoff = self.clock.now() - WindowKind::Day.length();
        let timeout = self.store.policy().timeout;
        let pruned = bounded(
            timeout,
            "prune rate limit events",
            self.events.prune_before(cutoff),
        )
        .await?;

        if pruned > 0 {
            debug!("Pruned {} expired rate limit events", pruned);
        }
        Ok(pruned)
    }
}
