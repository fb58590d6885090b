//! API Key domain
//!
//! Issued credentials, their lifecycle invariants and the storage contract used by
//! both the authentication path and the administration surface.

mod entity;
mod repository;
mod validation;

pub use entity::{
    ApiKey, ApiKeyId, ApiKeyRecord, ApiKeyUpdate, DEFAULT_RATE_LIMIT, InactiveReason, Revocation,
};
#[cfg(test)]
pub use repository::MockApiKeyRepository;
pub use repository::{ApiKeyFilter, ApiKeyPage, ApiKeyRepository, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use validation::{
    ApiKeyValidationError, validate_api_key_name, validate_description, validate_expiry,
    validate_rate_limit,
};
