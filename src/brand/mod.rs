// Brand profile vectorize-on-save hook

#[cfg(test)]
mod tests;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::embeddings::{EmbeddingService, VectorizeOutcome};

pub const PROFILE_CONTENT_ID: &str = "brandProfile";
pub const PROFILE_CONTENT_TYPE: &str = "brand_profile";
pub const LOGO_CONTENT_ID: &str = "currentLogo";
pub const LOGO_CONTENT_TYPE: &str = "logo";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrandProfile {
    pub brand_name: String,
    pub brand_description: String,
    pub industry: String,
    pub target_audience: String,
    pub target_keywords: Vec<String>,
    pub brand_voice: String,
    pub image_style_notes: String,
    pub logo_url: Option<String>,
}

impl BrandProfile {
    /// The profile's text fields joined in a fixed order, empty ones left out
    #[inline]
    pub fn profile_text(&self) -> String {
        let keywords = self.target_keywords.join(", ");
        [
            self.brand_name.as_str(),
            self.brand_description.as_str(),
            self.industry.as_str(),
            self.target_audience.as_str(),
            keywords.as_str(),
            self.brand_voice.as_str(),
            self.image_style_notes.as_str(),
        ]
        .iter()
        .map(|field| field.trim())
        .filter(|field| !field.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
    }

    #[inline]
    pub fn logo(&self) -> Option<&str> {
        self.logo_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandVectorizeResult {
    pub success: bool,
    pub text_vectorized: bool,
    pub logo_vectorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_outcome: Option<VectorizeOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo_outcome: Option<VectorizeOutcome>,
}

#[derive(Debug, Clone)]
pub struct BrandVectorizer {
    embeddings: Arc<EmbeddingService>,
}

impl BrandVectorizer {
    #[inline]
    pub fn new(embeddings: Arc<EmbeddingService>) -> Self {
        Self { embeddings }
    }

    /// Re-embed the profile text and logo when a save changed them
    #[inline]
    pub async fn on_save(
        &self,
        user_id: &str,
        old: Option<&BrandProfile>,
        new: &BrandProfile,
    ) -> BrandVectorizeResult {
        let text_outcome = self.vectorize_text(user_id, old, new).await;
        let logo_outcome = self.vectorize_logo(user_id, old, new).await;

        let failed = [&text_outcome, &logo_outcome]
            .iter()
            .any(|outcome| matches!(outcome, Some(VectorizeOutcome::Failed { .. })));

        BrandVectorizeResult {
            success: !failed,
            text_vectorized: text_outcome.as_ref().is_some_and(VectorizeOutcome::is_stored),
            logo_vectorized: logo_outcome.as_ref().is_some_and(VectorizeOutcome::is_stored),
            text_outcome,
            logo_outcome,
        }
    }

    async fn vectorize_text(
        &self,
        user_id: &str,
        old: Option<&BrandProfile>,
        new: &BrandProfile,
    ) -> Option<VectorizeOutcome> {
        let new_text = new.profile_text();
        if new_text.is_empty() {
            debug!("Brand profile for {} has no text to vectorize", user_id);
            return None;
        }

        let old_text = old.map(BrandProfile::profile_text);
        Some(
            self.embeddings
                .vectorize_if_changed(
                    user_id,
                    PROFILE_CONTENT_ID,
                    PROFILE_CONTENT_TYPE,
                    old_text.as_deref(),
                    &new_text,
                )
                .await,
        )
    }

    async fn vectorize_logo(
        &self,
        user_id: &str,
        old: Option<&BrandProfile>,
        new: &BrandProfile,
    ) -> Option<VectorizeOutcome> {
        let logo = new.logo()?;
        if old.and_then(BrandProfile::logo) == Some(logo) {
            return None;
        }

        match self
            .embeddings
            .vectors()
            .get(user_id, LOGO_CONTENT_TYPE, LOGO_CONTENT_ID)
            .await
        {
            Ok(Some(existing)) if existing.source_text == logo => {
                debug!("Logo for {} already vectorized", user_id);
                return Some(VectorizeOutcome::Unchanged);
            }
            Ok(_) => {}
            Err(e) => warn!("Could not check existing logo vector for {}: {}", user_id, e),
        }

        Some(
            self.embeddings
                .vectorize(user_id, LOGO_CONTENT_ID, LOGO_CONTENT_TYPE, logo)
                .await,
        )
    }
}
