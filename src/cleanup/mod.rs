// Vector cleanup and periodic maintenance
// A vector is deleted only when it is both past retention and underperforming


use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::config::{ConfigStore, VectorCleanupConfig};
use crate::rate_limit::RateLimiter;
use crate::storage::{EmbeddingVector, VectorRepository};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
    pub enabled: bool,
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
    pub swept_at: DateTime<Utc>,
}

/// Whether `vector` is past retention and below the performance threshold at `now`
#[inline]
pub fn is_expendable(
    vector: &EmbeddingVector,
    policy: &VectorCleanupConfig,
    now: DateTime<Utc>,
) -> bool {
    // A cutoff before the representable range means nothing is stale yet
    let stale = chrono::Duration::try_days(i64::from(policy.retention_days))
        .and_then(|retention| now.checked_sub_signed(retention))
        .is_some_and(|cutoff| vector.created_at < cutoff);
    let underperforming = vector.performance_score < policy.min_performance_threshold;
    stale && underperforming
}

#[derive(Debug)]
pub struct VectorCleanup {
    vectors: VectorRepository,
    config: Arc<ConfigStore>,
    clock: Arc<dyn Clock>,
}

impl VectorCleanup {
    #[inline]
    pub fn new(vectors: VectorRepository, config: Arc<ConfigStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            vectors,
            config,
            clock,
        }
    }

    /// Delete every expendable vector across all users
    #[inline]
    pub async fn sweep(&self) -> Result<CleanupReport> {
        let config = self.config.load_config().await;
        let policy = &config.vector_cleanup;
        let now = self.clock.now();

        let mut report = CleanupReport {
            enabled: policy.enabled,
            scanned: 0,
            deleted: 0,
            failed: 0,
            swept_at: now,
        };

        if !policy.enabled {
            debug!("Vector cleanup disabled");
            return Ok(report);
        }

        let vectors = self.vectors.list_all().await?;
        report.scanned = vectors.len();

        for vector in vectors.iter().filter(|v| is_expendable(v, policy, now)) {
            match self.vectors.delete(vector).await {
                Ok(true) => {
                    debug!(
                        "Deleted vector {} ({} days old, score {:.2})",
                        vector.id,
                        vector.age_days(now),
                        vector.performance_score
                    );
                    report.deleted += 1;
                }
                Ok(false) => debug!("Vector {} already gone", vector.id),
                Err(e) => {
                    warn!("Failed to delete vector {}: {}", vector.id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Vector cleanup scanned {} vectors, deleted {}, failed {}",
            report.scanned, report.deleted, report.failed
        );
        Ok(report)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    pub cleanup: Option<CleanupReport>,
    pub pruned_events: Option<u64>,
}

/// Periodic sweep plus rate-limit event pruning
#[derive(Debug, Clone)]
pub struct MaintenanceTask {
    cleanup: Arc<VectorCleanup>,
    rate_limiter: Arc<RateLimiter>,
    interval: Duration,
}

impl MaintenanceTask {
    #[inline]
    pub fn new(cleanup: Arc<VectorCleanup>, rate_limiter: Arc<RateLimiter>, interval: Duration) -> Self {
        Self {
            cleanup,
            rate_limiter,
            interval,
        }
    }

    /// One maintenance pass; failures are logged and reported as `None`
    #[inline]
    pub async fn run_once(&self) -> MaintenanceReport {
        let cleanup = match self.cleanup.sweep().await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Vector cleanup failed: {}", e);
                None
            }
        };

        let pruned_events = match self.rate_limiter.prune_expired_events().await {
            Ok(pruned) => Some(pruned),
            Err(e) => {
                error!("Pruning rate limit events failed: {}", e);
                None
            }
        };

        MaintenanceReport {
            cleanup,
            pruned_events,
        }
    }

    /// Run a pass immediately and then every interval until the handle is aborted
    #[inline]
    pub fn spawn(self) -> JoinHandle<()> {
        info!("Starting maintenance every {:?}", self.interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }
}
