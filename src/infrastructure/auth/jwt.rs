//! Admin bearer tokens (HS256 JWT)

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::domain::{DomainError, TenantId};

/// Ten years
const MAX_TTL_HOURS: u64 = 24 * 365 * 10;

/// Claims carried by an admin token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Subject (admin identity, recorded as `created_by` / `revoked_by`)
    pub sub: String,
    /// Tenant the admin acts within
    pub tenant_id: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: i64,
    /// Expiration timestamp (Unix epoch)
    pub exp: i64,
}

impl AdminClaims {
    pub fn new(subject: impl Into<String>, tenant_id: &TenantId, ttl_hours: u64) -> Self {
        let now = Utc::now();
        let ttl = i64::try_from(ttl_hours.min(MAX_TTL_HOURS)).unwrap_or(0);
        let exp = now.timestamp() + Duration::hours(ttl).num_seconds();

        Self {
            sub: subject.into(),
            tenant_id: tenant_id.as_str().to_string(),
            iat: now.timestamp(),
            exp,
        }
    }

    /// Tenant claim parsed into a validated id
    pub fn tenant(&self) -> Result<TenantId, DomainError> {
        TenantId::new(self.tenant_id.as_str())
            .map_err(|e| DomainError::validation(format!("Invalid tenant claim: {}", e)))
    }
}

/// Issues and verifies admin tokens with a shared secret
#[derive(Clone)]
pub struct AdminTokenService {
    ttl_hours: u64,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl Debug for AdminTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminTokenService")
            .field("ttl_hours", &self.ttl_hours)
            .field("encoding_key", &"[hidden]")
            .field("decoding_key", &"[hidden]")
            .finish()
    }
}

impl AdminTokenService {
    pub fn new(secret: &str, ttl_hours: u64) -> Result<Self, DomainError> {
        if secret.is_empty() {
            return Err(DomainError::configuration("Admin JWT secret must not be empty"));
        }

        Ok(Self {
            ttl_hours,
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        })
    }

    /// Sign a token for `subject` acting within `tenant_id`
    pub fn issue(&self, subject: &str, tenant_id: &TenantId) -> Result<String, DomainError> {
        let claims = AdminClaims::new(subject, tenant_id, self.ttl_hours);

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| DomainError::internal(format!("Failed to sign admin token: {}", e)))
    }

    /// Check signature and expiry, returning the claims
    pub fn verify(&self, token: &str) -> Result<AdminClaims, DomainError> {
        let validation = Validation::new(Algorithm::HS256);

        let token_data = decode::<AdminClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| DomainError::validation(format!("Invalid admin token: {}", e)))?;

        Ok(token_data.claims)
    }
}
