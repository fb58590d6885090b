//! Authentication outcomes

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::api_key::{ApiKey, InactiveReason};
use crate::domain::tenant::TenantId;
use crate::domain::DomainError;

/// Result of a rate-limit check, computed fresh per request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
}

impl RateLimitDecision {
    /// Seconds from `now` until the window resets, never negative
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((self.reset_time - now).num_seconds()).unwrap_or(0)
    }
}

/// Outcome of a successful authentication, attached to the request
#[derive(Debug, Clone)]
pub struct AuthenticationContext {
    pub api_key: ApiKey,
    pub rate_limit: RateLimitDecision,
}

impl AuthenticationContext {
    pub fn tenant_id(&self) -> &TenantId {
        self.api_key.tenant_id()
    }
}

/// Terminal authentication failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingHeader,

    #[error("Invalid Authorization header format. Expected 'Bearer <api-key>'")]
    MalformedHeader,

    #[error("Invalid API key format")]
    InvalidFormat,

    #[error("Invalid API key")]
    InvalidKey,

    #[error("API key has been revoked")]
    Revoked,

    #[error("API key has expired")]
    Expired,

    #[error("API key is inactive")]
    Inactive,

    #[error("Rate limit exceeded")]
    RateLimited(RateLimitDecision),

    #[error("API key is not authorized for tenant '{requested}'")]
    TenantMismatch { requested: String },

    #[error("Internal failure: {0}")]
    Internal(String),
}

impl AuthError {
    /// Short label used for metrics and logs
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::MissingHeader => "missing_header",
            Self::MalformedHeader => "malformed_header",
            Self::InvalidFormat => "invalid_format",
            Self::InvalidKey => "invalid_key",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
            Self::Inactive => "inactive",
            Self::RateLimited(_) => "rate_limited",
            Self::TenantMismatch { .. } => "tenant_mismatch",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<InactiveReason> for AuthError {
    fn from(reason: InactiveReason) -> Self {
        match reason {
            InactiveReason::Revoked => Self::Revoked,
            InactiveReason::Expired => Self::Expired,
            InactiveReason::Inactive => Self::Inactive,
        }
    }
}

impl From<DomainError> for AuthError {
    fn from(err: DomainError) -> Self {
        Self::Internal(err.to_string())
    }
}
