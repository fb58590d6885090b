//! API key management admin endpoints
//!
//! Every operation is scoped to the tenant named in the admin token.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::api::middleware::RequireAdmin;
use crate::api::state::AppState;
use crate::api::types::{ApiError, ApiResponse, Json};
use crate::domain::api_key::{ApiKey, ApiKeyFilter, ApiKeyId, ApiKeyUpdate};
use crate::infrastructure::api_key::NewApiKey;

/// Request to create a new API key
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<u32>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Partial update. `null` clears `description` / `expiresAt`; absent leaves them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApiKeyRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub rate_limit: Option<u32>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Distinguish an explicit `null` from an absent field
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl From<UpdateApiKeyRequest> for ApiKeyUpdate {
    fn from(req: UpdateApiKeyRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            rate_limit: req.rate_limit,
            expires_at: req.expires_at,
            is_active: req.is_active,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevokeApiKeyRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListApiKeysQuery {
    pub active: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Revocation details in responses
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevocationResponse {
    pub revoked_at: DateTime<Utc>,
    pub revoked_by: String,
    pub reason: Option<String>,
}

/// API key as shown to admins. Never includes the hash or the secret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyResponse {
    pub id: ApiKeyId,
    pub name: String,
    pub description: Option<String>,
    pub key_prefix: String,
    pub tenant_id: String,
    pub created_by: String,
    pub rate_limit: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_used_ip: Option<String>,
    pub usage_count: u64,
    pub is_active: bool,
    pub revocation: Option<RevocationResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ApiKey> for ApiKeyResponse {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: *key.id(),
            name: key.name().to_string(),
            description: key.description().map(String::from),
            key_prefix: key.key_prefix().to_string(),
            tenant_id: key.tenant_id().to_string(),
            created_by: key.created_by().to_string(),
            rate_limit: key.rate_limit(),
            expires_at: key.expires_at(),
            last_used_at: key.last_used_at(),
            last_used_ip: key.last_used_ip().map(String::from),
            usage_count: key.usage_count(),
            is_active: key.is_active(),
            revocation: key.revocation().map(|r| RevocationResponse {
                revoked_at: r.revoked_at,
                revoked_by: r.revoked_by.clone(),
                reason: r.reason.clone(),
            }),
            created_at: key.created_at(),
            updated_at: key.updated_at(),
        }
    }
}

/// Creation response; the only time the secret is returned
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKeyWithSecretResponse {
    #[serde(flatten)]
    pub api_key: ApiKeyResponse,
    pub key: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListApiKeysResponse {
    pub items: Vec<ApiKeyResponse>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteApiKeyResponse {
    pub id: ApiKeyId,
    pub usage_entries_removed: u64,
}

pub(crate) fn parse_key_id(raw: &str) -> Result<ApiKeyId, ApiError> {
    raw.parse::<ApiKeyId>().map_err(ApiError::from)
}

/// GET /admin/api-keys
pub async fn list_api_keys(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Query(query): Query<ListApiKeysQuery>,
) -> Result<ApiResponse<ListApiKeysResponse>, ApiError> {
    debug!(tenant_id = %admin.tenant_id, "Admin listing API keys");

    let filter = ApiKeyFilter::new(admin.tenant_id)
        .with_active(query.active)
        .with_search(query.search)
        .with_page(query.page, query.limit);

    let page = state.api_key_service.list(&filter).await?;

    Ok(ApiResponse::ok(
        ListApiKeysResponse {
            items: page.items.iter().map(ApiKeyResponse::from).collect(),
            total: page.total,
            page: page.page,
            limit: page.limit,
        },
        "API keys retrieved",
    ))
}

/// POST /admin/api-keys
pub async fn create_api_key(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<ApiResponse<ApiKeyWithSecretResponse>, ApiError> {
    let created = state
        .api_key_service
        .create(
            &admin.tenant_id,
            &admin.actor,
            NewApiKey {
                name: request.name,
                description: request.description,
                rate_limit: request.rate_limit,
                expires_at: request.expires_at,
            },
        )
        .await?;

    Ok(ApiResponse::created(
        ApiKeyWithSecretResponse {
            api_key: ApiKeyResponse::from(&created.api_key),
            key: created.secret,
        },
        "API key created. Store the key now; it will not be shown again",
    ))
}

/// GET /admin/api-keys/{key_id}
pub async fn get_api_key(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(key_id): Path<String>,
) -> Result<ApiResponse<ApiKeyResponse>, ApiError> {
    let id = parse_key_id(&key_id)?;
    let key = state.api_key_service.get(&admin.tenant_id, &id).await?;

    Ok(ApiResponse::ok(ApiKeyResponse::from(&key), "API key retrieved"))
}

/// PATCH /admin/api-keys/{key_id}
pub async fn update_api_key(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(key_id): Path<String>,
    Json(request): Json<UpdateApiKeyRequest>,
) -> Result<ApiResponse<ApiKeyResponse>, ApiError> {
    let id = parse_key_id(&key_id)?;
    let key = state
        .api_key_service
        .update(&admin.tenant_id, &id, request.into())
        .await?;

    Ok(ApiResponse::ok(ApiKeyResponse::from(&key), "API key updated"))
}

/// POST /admin/api-keys/{key_id}/revoke
pub async fn revoke_api_key(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(key_id): Path<String>,
    body: Bytes,
) -> Result<ApiResponse<ApiKeyResponse>, ApiError> {
    let id = parse_key_id(&key_id)?;

    // The body is optional; an empty one revokes without a reason.
    let request: RevokeApiKeyRequest = if body.is_empty() {
        RevokeApiKeyRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON data: {}", e)))?
    };
    let reason = request.reason;

    let key = state
        .api_key_service
        .revoke(&admin.tenant_id, &id, &admin.actor, reason)
        .await?;

    Ok(ApiResponse::ok(ApiKeyResponse::from(&key), "API key revoked"))
}

/// DELETE /admin/api-keys/{key_id}
pub async fn delete_api_key(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(key_id): Path<String>,
) -> Result<ApiResponse<DeleteApiKeyResponse>, ApiError> {
    let id = parse_key_id(&key_id)?;
    let deleted = state.api_key_service.delete(&admin.tenant_id, &id).await?;

    Ok(ApiResponse::ok(
        DeleteApiKeyResponse {
            id: deleted.id,
            usage_entries_removed: deleted.usage_entries_removed,
        },
        "API key deleted",
    ))
}
