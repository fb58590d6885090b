//! Who am I: echoes the authenticated key

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::middleware::Authenticated;
use crate::api::types::{ApiResponse, RateLimitInfo};
use crate::domain::api_key::ApiKeyId;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub key_id: ApiKeyId,
    pub name: String,
    pub key_prefix: String,
    pub tenant_id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub rate_limit: RateLimitInfo,
}

/// GET /v1/session
pub async fn get_session(Authenticated(context): Authenticated) -> ApiResponse<SessionResponse> {
    let key = &context.api_key;

    ApiResponse::ok(
        SessionResponse {
            key_id: *key.id(),
            name: key.name().to_string(),
            key_prefix: key.key_prefix().to_string(),
            tenant_id: key.tenant_id().to_string(),
            expires_at: key.expires_at(),
            rate_limit: context.rate_limit.into(),
        },
        "Authenticated",
    )
}
