//! Admin authentication extractor
//!
//! The admin surface is guarded by a bearer JWT whose claims name the acting
//! admin and the tenant every operation is scoped to.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use tracing::debug;

use crate::api::state::AppState;
use crate::api::types::ApiError;
use crate::domain::TenantId;

/// Authenticated administrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminAuth {
    /// Recorded as `created_by` / `revoked_by`
    pub actor: String,
    pub tenant_id: TenantId,
}

/// Extractor that requires a valid admin token
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AdminAuth);

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Admin token required"))?;

        let claims = state.admin_tokens.verify(token).map_err(|e| {
            debug!(error = %e, "Admin token rejected");
            ApiError::unauthorized("Invalid admin token")
        })?;

        let tenant_id = claims
            .tenant()
            .map_err(|_| ApiError::unauthorized("Invalid admin token"))?;

        debug!(actor = %claims.sub, tenant_id = %tenant_id, "Admin access via JWT");

        Ok(RequireAdmin(AdminAuth {
            actor: claims.sub,
            tenant_id,
        }))
    }
}
