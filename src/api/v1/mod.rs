//! v1 API endpoints served to API key holders

pub mod session;
pub mod usage;

use axum::{routing::get, Router};

use super::middleware::{protect, TenantScope};
use super::state::AppState;

/// Create v1 API router. `/session` is plain; `/usage` enforces the key's tenant.
pub fn create_v1_router(state: AppState) -> Router<AppState> {
    let plain = Router::new().route("/session", get(session::get_session));
    let scoped = Router::new().route("/usage", get(usage::get_own_usage));

    protect(plain, state.clone(), TenantScope::Unscoped)
        .merge(protect(scoped, state, TenantScope::Enforced))
}
