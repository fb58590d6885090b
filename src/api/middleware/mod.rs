//! API middleware components

pub mod admin_auth;
pub mod auth;
pub mod logging;
pub mod metrics;

pub use admin_auth::{AdminAuth, RequireAdmin};
pub use auth::{api_key_auth, protect, Authenticated, TenantScope};
pub use logging::logging_middleware;
pub use self::metrics::metrics_middleware;
