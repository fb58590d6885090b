//! Error bodies returned by the gateway
//!
//! Every error is rendered as `{ "data": null, "message": ..., "status": ... }`.
//! Rate-limit rejections also carry `limit`, `remaining` and `resetTime`.

use axum::{
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::domain::{AuthError, DomainError, RateLimitDecision};

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Rate-limit fields attached to a 429 body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub limit: u32,
    pub remaining: u32,
    pub reset_time: DateTime<Utc>,
}

impl From<RateLimitDecision> for RateLimitInfo {
    fn from(decision: RateLimitDecision) -> Self {
        Self {
            limit: decision.limit,
            remaining: decision.remaining,
            reset_time: decision.reset_time,
        }
    }
}

/// Error body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub data: Option<serde_json::Value>,
    pub message: String,
    pub status: u16,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
}

/// API error with status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ApiErrorResponse,
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            response: ApiErrorResponse {
                data: None,
                message: message.into(),
                status: status.as_u16(),
                rate_limit: None,
            },
            retry_after: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    /// Rate limit error; `now` anchors the `Retry-After` header
    pub fn rate_limited(decision: RateLimitDecision, now: DateTime<Utc>) -> Self {
        let mut err = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            AuthError::RateLimited(decision).to_string(),
        );
        err.response.rate_limit = Some(decision.into());
        err.retry_after = Some(decision.retry_after_secs(now));
        err
    }

    /// Internal server error. The detail is logged, never returned.
    pub fn internal(detail: impl std::fmt::Display) -> Self {
        error!(error = %detail, "Internal server error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
    }

    /// Map an authentication failure at `now`
    pub fn from_auth_error(err: AuthError, now: DateTime<Utc>) -> Self {
        match err {
            AuthError::RateLimited(decision) => Self::rate_limited(decision, now),
            AuthError::TenantMismatch { .. } => Self::forbidden(err.to_string()),
            AuthError::Internal(detail) => Self::internal(detail),
            other => Self::unauthorized(other.to_string()),
        }
    }
}

/// `X-RateLimit-*` header values for a decision
pub fn rate_limit_headers(decision: &RateLimitDecision) -> [(HeaderName, HeaderValue); 3] {
    [
        (RATE_LIMIT_LIMIT, HeaderValue::from(decision.limit)),
        (RATE_LIMIT_REMAINING, HeaderValue::from(decision.remaining)),
        (
            RATE_LIMIT_RESET,
            HeaderValue::from(decision.reset_time.timestamp()),
        ),
    ]
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(&self.response)).into_response();

        if let Some(info) = self.response.rate_limit {
            let headers = response.headers_mut();
            headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(info.limit));
            headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(info.remaining));
            headers.insert(RATE_LIMIT_RESET, HeaderValue::from(info.reset_time.timestamp()));
        }
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::from_auth_error(err, Utc::now())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotFound { message } => Self::not_found(message),
            DomainError::Validation { message } => Self::bad_request(message),
            DomainError::Conflict { message } | DomainError::AlreadyRevoked { message } => {
                Self::conflict(message)
            }
            internal => Self::internal(internal),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status, self.response.message)
    }
}

impl std::error::Error for ApiError {}
