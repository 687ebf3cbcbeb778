use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use super::error::{ApiError, ApiJson};
use crate::brand::{BrandProfile, BrandVectorizeResult};
use crate::cleanup::CleanupReport;
use crate::config::{ConfigError, SystemConfig};
use crate::engine::{RagEngine, RagEnhancement, RagRequest};
use crate::experiment::AbTestConfig;
use crate::feedback::{FeedbackRecord, FeedbackSummary};
use crate::rate_limit::RateLimitOverride;

/// Header carrying the caller's identity on admin routes
pub const USER_ID_HEADER: &str = "x-user-id";

type ApiResult<T> = Result<Json<T>, ApiError>;

fn actor(headers: &HeaderMap) -> &str {
    headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct UpdateConfigRequest {
    pub config: SystemConfig,
}

#[derive(Debug, Serialize)]
pub struct UpdateConfigResponse {
    pub success: bool,
    pub version: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandRequest {
    pub user_id: String,
    #[serde(default)]
    pub old_brand: Option<BrandProfile>,
    pub new_brand: BrandProfile,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub feedback: FeedbackRecord,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: FeedbackSummary,
}

#[derive(Debug, Serialize)]
pub struct LimitedUsersResponse {
    pub users: Vec<RateLimitOverride>,
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn get_config(State(engine): State<Arc<RagEngine>>) -> Json<SystemConfig> {
    Json(engine.config().load_config().await)
}

pub async fn update_config(
    State(engine): State<Arc<RagEngine>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<UpdateConfigRequest>,
) -> ApiResult<UpdateConfigResponse> {
    let saved = engine
        .config()
        .update_config(request.config, actor(&headers))
        .await?;

    Ok(Json(UpdateConfigResponse {
        success: true,
        version: saved.version,
    }))
}

pub async fn vectorize_brand(
    State(engine): State<Arc<RagEngine>>,
    ApiJson(request): ApiJson<BrandRequest>,
) -> ApiResult<BrandVectorizeResult> {
    if request.user_id.trim().is_empty() {
        return Err(ConfigError::MissingField("userId").into());
    }

    let result = engine
        .brand()
        .on_save(&request.user_id, request.old_brand.as_ref(), &request.new_brand)
        .await;
    Ok(Json(result))
}

pub async fn limited_users(
    State(engine): State<Arc<RagEngine>>,
    headers: HeaderMap,
) -> ApiResult<LimitedUsersResponse> {
    engine.config().authorize(actor(&headers))?;
    let users = engine.rate_limiter().limited_users().await?;
    Ok(Json(LimitedUsersResponse { users }))
}

pub async fn set_override(
    State(engine): State<Arc<RagEngine>>,
    headers: HeaderMap,
    ApiJson(user_override): ApiJson<RateLimitOverride>,
) -> ApiResult<RateLimitOverride> {
    let stored = engine
        .rate_limiter()
        .set_override(user_override, actor(&headers))
        .await?;
    Ok(Json(stored))
}

pub async fn submit_feedback(
    State(engine): State<Arc<RagEngine>>,
    ApiJson(request): ApiJson<FeedbackRequest>,
) -> ApiResult<FeedbackResponse> {
    let summary = engine.feedback().record(request.feedback).await?;
    Ok(Json(FeedbackResponse {
        success: true,
        summary,
    }))
}

pub async fn rag_context(
    State(engine): State<Arc<RagEngine>>,
    ApiJson(request): ApiJson<RagRequest>,
) -> ApiResult<RagEnhancement> {
    if request.user_id.trim().is_empty() {
        return Err(ConfigError::MissingField("userId").into());
    }
    Ok(Json(engine.enhance(&request).await))
}

pub async fn get_ab_test(State(engine): State<Arc<RagEngine>>) -> ApiResult<AbTestConfig> {
    let assignment = engine.assignment();
    assignment.current_test().await?.map(Json).ok_or_else(|| {
        ApiError::NotFound(format!("no A/B test named '{}'", assignment.test_name()))
    })
}

pub async fn save_ab_test(
    State(engine): State<Arc<RagEngine>>,
    headers: HeaderMap,
    ApiJson(test): ApiJson<AbTestConfig>,
) -> ApiResult<AbTestConfig> {
    let saved = engine.assignment().save_test(test, actor(&headers)).await?;
    Ok(Json(saved))
}

pub async fn run_cleanup(
    State(engine): State<Arc<RagEngine>>,
    headers: HeaderMap,
) -> ApiResult<CleanupReport> {
    let actor = actor(&headers);
    engine.config().authorize(actor)?;

    let report = engine.cleanup().sweep().await?;
    info!(
        "Cleanup requested by {}: {} of {} vectors deleted",
        actor, report.deleted, report.scanned
    );
    Ok(Json(report))
}
