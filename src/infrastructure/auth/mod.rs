//! Authentication infrastructure module
//!
//! The API key pipeline used on every protected request, and the JWT service
//! guarding the administration surface.

mod jwt;
mod pipeline;

pub use jwt::{AdminClaims, AdminTokenService};
pub use pipeline::{AuthRequest, AuthenticationPipeline, TenantScope};
