//! Application state for shared services

use std::sync::Arc;

use crate::infrastructure::api_key::ApiKeyService;
use crate::infrastructure::auth::{AdminTokenService, AuthenticationPipeline};

/// Services shared by every handler, built once at startup
#[derive(Debug, Clone)]
pub struct AppState {
    pub api_key_service: Arc<ApiKeyService>,
    pub pipeline: Arc<AuthenticationPipeline>,
    pub admin_tokens: Arc<AdminTokenService>,
    /// Attach `X-RateLimit-*` headers to authenticated responses
    pub expose_rate_limit_headers: bool,
}

impl AppState {
    pub fn new(
        api_key_service: Arc<ApiKeyService>,
        pipeline: Arc<AuthenticationPipeline>,
        admin_tokens: Arc<AdminTokenService>,
    ) -> Self {
        Self {
            api_key_service,
            pipeline,
            admin_tokens,
            expose_rate_limit_headers: true,
        }
    }

    pub fn with_rate_limit_headers(mut self, expose: bool) -> Self {
        self.expose_rate_limit_headers = expose;
        self
    }
}
