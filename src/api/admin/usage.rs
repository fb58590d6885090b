//! Usage ledger admin endpoints

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::api_keys::parse_key_id;
use crate::api::middleware::RequireAdmin;
use crate::api::state::AppState;
use crate::api::types::{ApiError, ApiResponse};
use crate::domain::api_key::ApiKeyId;
use crate::domain::usage::{UsageLogEntry, UsageQuery, UsageStats};

#[derive(Debug, Default, Deserialize)]
pub struct UsageQueryParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl UsageQueryParams {
    fn into_query(self) -> UsageQuery {
        let mut query = UsageQuery::new().with_time_range(self.from, self.to);
        if let Some(limit) = self.limit {
            query = query.with_limit(limit);
        }
        if let Some(offset) = self.offset {
            query = query.with_offset(offset);
        }
        query
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsQueryParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLogResponse {
    pub id: String,
    pub api_key_id: ApiKeyId,
    pub tenant_id: String,
    pub endpoint: String,
    pub method: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_size: Option<u64>,
    pub response_status: u16,
    pub response_time_ms: u64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&UsageLogEntry> for UsageLogResponse {
    fn from(entry: &UsageLogEntry) -> Self {
        Self {
            id: entry.id().to_string(),
            api_key_id: *entry.api_key_id(),
            tenant_id: entry.tenant_id().to_string(),
            endpoint: entry.endpoint().to_string(),
            method: entry.method().to_string(),
            ip_address: entry.ip_address().map(String::from),
            user_agent: entry.user_agent().map(String::from),
            request_size: entry.request_size(),
            response_status: entry.response_status(),
            response_time_ms: entry.response_time_ms(),
            error_message: entry.error_message().map(String::from),
            created_at: entry.created_at(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStatsResponse {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub avg_response_time_ms: f64,
    pub success_rate: f64,
    pub by_endpoint: BTreeMap<String, u64>,
    pub by_status: BTreeMap<u16, u64>,
}

impl From<UsageStats> for UsageStatsResponse {
    fn from(stats: UsageStats) -> Self {
        Self {
            success_rate: stats.success_rate(),
            total_requests: stats.total_requests,
            successful_requests: stats.successful_requests,
            failed_requests: stats.failed_requests,
            rate_limited_requests: stats.rate_limited_requests,
            avg_response_time_ms: stats.avg_response_time_ms,
            by_endpoint: stats.by_endpoint,
            by_status: stats.by_status,
        }
    }
}

/// GET /admin/api-keys/{key_id}/usage
pub async fn list_usage(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(key_id): Path<String>,
    Query(params): Query<UsageQueryParams>,
) -> Result<ApiResponse<Vec<UsageLogResponse>>, ApiError> {
    let id = parse_key_id(&key_id)?;

    let entries = state
        .api_key_service
        .usage(&admin.tenant_id, &id, params.into_query())
        .await?;

    Ok(ApiResponse::ok(
        entries.iter().map(UsageLogResponse::from).collect(),
        "Usage retrieved",
    ))
}

/// GET /admin/api-keys/{key_id}/usage/stats
pub async fn usage_stats(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(key_id): Path<String>,
    Query(params): Query<StatsQueryParams>,
) -> Result<ApiResponse<UsageStatsResponse>, ApiError> {
    let id = parse_key_id(&key_id)?;

    let stats = state
        .api_key_service
        .usage_stats(&admin.tenant_id, &id, params.from, params.to)
        .await?;

    Ok(ApiResponse::ok(stats.into(), "Usage statistics retrieved"))
}
