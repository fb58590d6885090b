//! Usage of the calling key, restricted to its own tenant

use axum::extract::{Query, State};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::admin::usage::UsageStatsResponse;
use crate::api::middleware::Authenticated;
use crate::api::state::AppState;
use crate::api::types::{ApiError, ApiResponse};

#[derive(Debug, Default, Deserialize)]
pub struct OwnUsageParams {
    pub from: Option<DateTime<Utc>>,
}

/// GET /v1/usage
pub async fn get_own_usage(
    State(state): State<AppState>,
    Authenticated(context): Authenticated,
    Query(params): Query<OwnUsageParams>,
) -> Result<ApiResponse<UsageStatsResponse>, ApiError> {
    let key = &context.api_key;

    let stats = state
        .api_key_service
        .usage_stats(key.tenant_id(), key.id(), params.from, None)
        .await?;

    Ok(ApiResponse::ok(stats.into(), "Usage statistics retrieved"))
}
