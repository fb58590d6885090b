//! Tenant identity

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during tenant ID validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TenantValidationError {
    #[error("Tenant ID cannot be empty")]
    Empty,

    #[error("Tenant ID exceeds maximum length of {0} characters")]
    TooLong(usize),

    #[error("Tenant ID contains invalid character: '{0}'. Only alphanumeric characters, hyphens and underscores are allowed")]
    InvalidCharacter(char),
}

const MAX_TENANT_ID_LENGTH: usize = 64;

/// Tenant identifier - alphanumeric, hyphens and underscores, max 64 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    /// Create a new TenantId after validation
    pub fn new(id: impl Into<String>) -> Result<Self, TenantValidationError> {
        let id = id.into();
        validate_tenant_id(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a caller-supplied tenant filter names this tenant.
    ///
    /// The raw string is compared as-is, so malformed or unknown tenants never match.
    pub fn matches(&self, requested: &str) -> bool {
        self.0 == requested
    }
}

pub fn validate_tenant_id(id: &str) -> Result<(), TenantValidationError> {
    if id.is_empty() {
        return Err(TenantValidationError::Empty);
    }

    if id.len() > MAX_TENANT_ID_LENGTH {
        return Err(TenantValidationError::TooLong(MAX_TENANT_ID_LENGTH));
    }

    if let Some(c) = id
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(TenantValidationError::InvalidCharacter(c));
    }

    Ok(())
}

impl TryFrom<String> for TenantId {
    type Error = TenantValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_tenant_ids() {
        assert!(TenantId::new("acme").is_ok());
        assert!(TenantId::new("tenant-42").is_ok());
        assert!(TenantId::new("org_7f3a").is_ok());
    }

    #[test]
    fn test_invalid_tenant_ids() {
        assert_eq!(TenantId::new(""), Err(TenantValidationError::Empty));
        assert_eq!(
            TenantId::new("a".repeat(65)),
            Err(TenantValidationError::TooLong(64))
        );
        assert_eq!(
            TenantId::new("acme corp"),
            Err(TenantValidationError::InvalidCharacter(' '))
        );
    }

    #[test]
    fn test_matches_is_exact() {
        let tenant = TenantId::new("acme").unwrap();
        assert!(tenant.matches("acme"));
        assert!(!tenant.matches("ACME"));
        assert!(!tenant.matches("acme "));
        assert!(!tenant.matches("globex"));
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let parsed: Result<TenantId, _> = serde_json::from_str("\"bad tenant\"");
        assert!(parsed.is_err());

        let parsed: TenantId = serde_json::from_str("\"acme\"").unwrap();
        assert_eq!(parsed.as_str(), "acme");
    }
}
