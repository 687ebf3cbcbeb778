// A/B assignment for RAG enhancement
// Buckets are a pure function of the user id, so no assignment state is stored


use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{ConfigError, ConfigStore};
use crate::storage::{BoundedStore, path_segment};
use crate::Result;

pub const AB_TESTS_COLLECTION: &str = "abTests";
pub const BUCKET_COUNT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbTestConfig {
    pub test_name: String,
    pub rag_percentage: u32,
    #[serde(default)]
    pub is_active: bool,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    /// Content types the test applies to; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_types: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
}

impl AbTestConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.test_name.trim().is_empty() {
            return Err(ConfigError::InvalidTestName(self.test_name.clone()));
        }

        if self.rag_percentage > 100 {
            return Err(ConfigError::InvalidRagPercentage(self.rag_percentage));
        }

        if let Some(end_date) = self.end_date {
            if end_date <= self.start_date {
                return Err(ConfigError::InvalidTestWindow);
            }
        }

        Ok(())
    }

    #[inline]
    pub fn applies_to(&self, content_type: &str) -> bool {
        self.content_types.is_empty() || self.content_types.iter().any(|t| t == content_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestGroup {
    Rag,
    Baseline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbDecision {
    #[serde(rename = "useRAG")]
    pub use_rag: bool,
    pub test_group: TestGroup,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<u32>,
}

impl AbDecision {
    fn fixed(use_rag: bool, reason: &str) -> Self {
        Self {
            use_rag,
            test_group: if use_rag {
                TestGroup::Rag
            } else {
                TestGroup::Baseline
            },
            reason: reason.to_string(),
            bucket: None,
        }
    }
}

/// Sum of the user id's UTF-16 code units, mod 100
///
/// Stable across calls and processes but poorly distributed: ids that are
/// anagrams of each other always share a bucket.
#[inline]
pub fn user_bucket(user_id: &str) -> u32 {
    let sum: u64 = user_id.encode_utf16().map(u64::from).sum();
    (sum % u64::from(BUCKET_COUNT)) as u32
}

/// Decide whether `user_id` gets RAG under `test` at `now`
#[inline]
pub fn assign(
    test: Option<&AbTestConfig>,
    user_id: &str,
    content_type: &str,
    now: DateTime<Utc>,
) -> AbDecision {
    let Some(test) = test else {
        return AbDecision::fixed(true, "A/B test not configured");
    };

    if !test.is_active {
        return AbDecision::fixed(true, "A/B testing disabled");
    }

    if !test.applies_to(content_type) {
        return AbDecision::fixed(true, "content type not part of the test");
    }

    if now < test.start_date {
        return AbDecision::fixed(false, "test not started");
    }

    if test.end_date.is_some_and(|end| now > end) {
        return AbDecision::fixed(true, "test ended");
    }

    let bucket = user_bucket(user_id);
    let use_rag = bucket < test.rag_percentage;
    AbDecision {
        use_rag,
        test_group: if use_rag {
            TestGroup::Rag
        } else {
            TestGroup::Baseline
        },
        reason: format!(
            "bucket {} {} ragPercentage {}",
            bucket,
            if use_rag { "<" } else { ">=" },
            test.rag_percentage
        ),
        bucket: Some(bucket),
    }
}

#[derive(Debug)]
pub struct AbAssignment {
    store: BoundedStore,
    config: Arc<ConfigStore>,
    clock: Arc<dyn Clock>,
    test_name: String,
}

impl AbAssignment {
    #[inline]
    pub fn new(
        store: BoundedStore,
        config: Arc<ConfigStore>,
        clock: Arc<dyn Clock>,
        test_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            test_name: test_name.into(),
        }
    }

    #[inline]
    pub fn test_path(test_name: &str) -> String {
        format!("{}/{}", AB_TESTS_COLLECTION, path_segment(test_name))
    }

    #[inline]
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    #[inline]
    pub async fn current_test(&self) -> Result<Option<AbTestConfig>> {
        self.store.get_as(&Self::test_path(&self.test_name)).await
    }

    /// Assignment for `user_id` under the configured test
    ///
    /// An unreadable test definition counts as no test, so the user gets RAG.
    #[inline]
    pub async fn should_enhance_with_rag(&self, user_id: &str, content_type: &str) -> AbDecision {
        let test = match self.current_test().await {
            Ok(test) => test,
            Err(e) => {
                warn!("Could not load A/B test '{}': {}", self.test_name, e);
                None
            }
        };

        let decision = assign(test.as_ref(), user_id, content_type, self.clock.now());
        debug!(
            "A/B decision for {} ({}): {:?} ({})",
            user_id, content_type, decision.test_group, decision.reason
        );
        decision
    }

    /// Validate and store a test definition (admin only)
    #[inline]
    pub async fn save_test(&self, test: AbTestConfig, actor: &str) -> Result<AbTestConfig> {
        self.config.authorize(actor)?;
        test.validate()?;

        let stored = AbTestConfig {
            updated_by: Some(actor.to_string()),
            ..test
        };
        self.store
            .set_as(&Self::test_path(&stored.test_name), &stored)
            .await?;

        info!(
            "A/B test '{}' saved: {}% RAG, active: {}",
            stored.test_name, stored.rag_percentage, stored.is_active
        );
        Ok(stored)
    }
}
