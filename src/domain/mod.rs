//! Domain layer - Core business logic and entities

pub mod api_key;
pub mod auth;
pub mod clock;
pub mod error;
pub mod tenant;
pub mod usage;

pub use api_key::{
    ApiKey, ApiKeyFilter, ApiKeyId, ApiKeyPage, ApiKeyRepository, ApiKeyUpdate, InactiveReason,
    Revocation,
};
pub use auth::{AuthError, AuthenticationContext, RateLimitDecision};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use tenant::TenantId;
pub use usage::{RequestMetadata, UsageLogEntry, UsageQuery, UsageRepository, UsageStats};
