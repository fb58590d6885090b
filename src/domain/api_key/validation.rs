//! API Key validation utilities

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::DomainError;

/// Errors that can occur while validating API key fields
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiKeyValidationError {
    #[error("API key name cannot be empty")]
    EmptyName,

    #[error("API key name exceeds maximum length of {0} characters")]
    NameTooLong(usize),

    #[error("API key description exceeds maximum length of {0} characters")]
    DescriptionTooLong(usize),

    #[error("Rate limit must be between 1 and {0} requests per hour")]
    InvalidRateLimit(u32),

    #[error("Expiration must be in the future")]
    ExpiryInPast,

    #[error("A revoked API key cannot be reactivated")]
    ReactivateRevoked,
}

impl From<ApiKeyValidationError> for DomainError {
    fn from(err: ApiKeyValidationError) -> Self {
        DomainError::validation(err.to_string())
    }
}

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_DESCRIPTION_LENGTH: usize = 500;
pub const MAX_RATE_LIMIT: u32 = 1_000_000;

/// Validate a display name: non-blank, at most 100 characters
pub fn validate_api_key_name(name: &str) -> Result<(), ApiKeyValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ApiKeyValidationError::EmptyName);
    }

    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(ApiKeyValidationError::NameTooLong(MAX_NAME_LENGTH));
    }

    Ok(())
}

pub fn validate_description(description: Option<&str>) -> Result<(), ApiKeyValidationError> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LENGTH => Err(
            ApiKeyValidationError::DescriptionTooLong(MAX_DESCRIPTION_LENGTH),
        ),
        _ => Ok(()),
    }
}

pub fn validate_rate_limit(rate_limit: u32) -> Result<(), ApiKeyValidationError> {
    if rate_limit == 0 || rate_limit > MAX_RATE_LIMIT {
        return Err(ApiKeyValidationError::InvalidRateLimit(MAX_RATE_LIMIT));
    }

    Ok(())
}

pub fn validate_expiry(
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(), ApiKeyValidationError> {
    match expires_at {
        Some(at) if at <= now => Err(ApiKeyValidationError::ExpiryInPast),
        _ => Ok(()),
    }
}
