//! API Key entity and related types

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::validation::{
    validate_api_key_name, validate_description, validate_expiry, validate_rate_limit,
    ApiKeyValidationError,
};
use crate::domain::tenant::TenantId;
use crate::domain::DomainError;

/// Default ceiling, in requests per hour, for keys created without an explicit one
pub const DEFAULT_RATE_LIMIT: u32 = 1000;

/// API Key identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiKeyId(Uuid);

impl ApiKeyId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for ApiKeyId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| DomainError::validation(format!("Invalid API key ID '{}'", s)))
    }
}

impl std::fmt::Display for ApiKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Why a key can no longer authenticate.
///
/// Variants are listed in precedence order: a key that is both revoked and expired
/// reports `Revoked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InactiveReason {
    Revoked,
    Expired,
    Inactive,
}

/// Terminal revocation details
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub revoked_at: DateTime<Utc>,
    pub revoked_by: String,
    pub reason: Option<String>,
}

/// Partial update of the mutable fields of a key.
///
/// `description` and `expires_at` use a nested option so that `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiKeyUpdate {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub rate_limit: Option<u32>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}

impl ApiKeyUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.rate_limit.is_none()
            && self.expires_at.is_none()
            && self.is_active.is_none()
    }
}

/// Flat representation used by persistence adapters to rebuild a stored key
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    pub id: ApiKeyId,
    pub name: String,
    pub description: Option<String>,
    pub key_hash: String,
    pub key_prefix: String,
    pub tenant_id: TenantId,
    pub created_by: String,
    pub rate_limit: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_used_ip: Option<String>,
    pub usage_count: u64,
    pub is_active: bool,
    pub revocation: Option<Revocation>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API Key entity
///
/// Only the hash of the secret is kept. The tenant binding and the hash are fixed at
/// construction, and a recorded revocation can never be cleared.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiKey {
    id: ApiKeyId,
    name: String,
    description: Option<String>,
    key_hash: String,
    key_prefix: String,
    tenant_id: TenantId,
    created_by: String,
    rate_limit: u32,
    expires_at: Option<DateTime<Utc>>,
    last_used_at: Option<DateTime<Utc>>,
    last_used_ip: Option<String>,
    usage_count: u64,
    is_active: bool,
    revocation: Option<Revocation>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ApiKey {
    /// Create a new, active API key
    pub fn new(
        id: ApiKeyId,
        name: impl Into<String>,
        key_hash: impl Into<String>,
        key_prefix: impl Into<String>,
        tenant_id: TenantId,
        created_by: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            key_hash: key_hash.into(),
            key_prefix: key_prefix.into(),
            tenant_id,
            created_by: created_by.into(),
            rate_limit: DEFAULT_RATE_LIMIT,
            expires_at: None,
            last_used_at: None,
            last_used_ip: None,
            usage_count: 0,
            is_active: true,
            revocation: None,
            created_at,
            updated_at: created_at,
        }
    }

    /// Rebuild a key from its stored representation
    pub fn from_record(record: ApiKeyRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            description: record.description,
            key_hash: record.key_hash,
            key_prefix: record.key_prefix,
            tenant_id: record.tenant_id,
            created_by: record.created_by,
            rate_limit: record.rate_limit,
            expires_at: record.expires_at,
            last_used_at: record.last_used_at,
            last_used_ip: record.last_used_ip,
            usage_count: record.usage_count,
            // A revoked key is never active, whatever the stored flag says.
            is_active: record.is_active && record.revocation.is_none(),
            revocation: record.revocation,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }

    /// Flatten into the stored representation
    pub fn to_record(&self) -> ApiKeyRecord {
        ApiKeyRecord {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            key_hash: self.key_hash.clone(),
            key_prefix: self.key_prefix.clone(),
            tenant_id: self.tenant_id.clone(),
            created_by: self.created_by.clone(),
            rate_limit: self.rate_limit,
            expires_at: self.expires_at,
            last_used_at: self.last_used_at,
            last_used_ip: self.last_used_ip.clone(),
            usage_count: self.usage_count,
            is_active: self.is_active,
            revocation: self.revocation.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn with_rate_limit(mut self, rate_limit: u32) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_expiration(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    // Getters

    pub fn id(&self) -> &ApiKeyId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn key_hash(&self) -> &str {
        &self.key_hash
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn rate_limit(&self) -> u32 {
        self.rate_limit
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn last_used_at(&self) -> Option<DateTime<Utc>> {
        self.last_used_at
    }

    pub fn last_used_ip(&self) -> Option<&str> {
        self.last_used_ip.as_deref()
    }

    pub fn usage_count(&self) -> u64 {
        self.usage_count
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn revocation(&self) -> Option<&Revocation> {
        self.revocation.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // Status checks

    pub fn is_revoked(&self) -> bool {
        self.revocation.is_some()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Reason the key cannot authenticate at `now`, if any.
    ///
    /// Revocation is checked first, then expiry, then the active flag.
    pub fn inactive_reason(&self, now: DateTime<Utc>) -> Option<InactiveReason> {
        if self.is_revoked() {
            Some(InactiveReason::Revoked)
        } else if self.is_expired(now) {
            Some(InactiveReason::Expired)
        } else if !self.is_active {
            Some(InactiveReason::Inactive)
        } else {
            None
        }
    }

    // Mutators

    /// Apply a partial update of the mutable fields
    pub fn apply_update(
        &mut self,
        update: ApiKeyUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), ApiKeyValidationError> {
        if let Some(name) = &update.name {
            validate_api_key_name(name)?;
        }
        if let Some(description) = &update.description {
            validate_description(description.as_deref())?;
        }
        if let Some(rate_limit) = update.rate_limit {
            validate_rate_limit(rate_limit)?;
        }
        if let Some(expires_at) = update.expires_at {
            validate_expiry(expires_at, now)?;
        }
        if update.is_active == Some(true) && self.is_revoked() {
            return Err(ApiKeyValidationError::ReactivateRevoked);
        }

        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(rate_limit) = update.rate_limit {
            self.rate_limit = rate_limit;
        }
        if let Some(expires_at) = update.expires_at {
            self.expires_at = expires_at;
        }
        if let Some(is_active) = update.is_active {
            self.is_active = is_active;
        }

        self.touch(now);
        Ok(())
    }

    /// Revoke the key. A second revocation is rejected and leaves the first intact.
    pub fn revoke(
        &mut self,
        revoked_by: impl Into<String>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<&Revocation, DomainError> {
        if self.revocation.is_some() {
            return Err(DomainError::already_revoked(format!(
                "API key '{}' is already revoked",
                self.id
            )));
        }

        self.is_active = false;
        self.touch(now);
        Ok(self.revocation.insert(Revocation {
            revoked_at: now,
            revoked_by: revoked_by.into(),
            reason,
        }))
    }

    /// Record a successful authentication
    pub fn record_usage(&mut self, ip: Option<String>, at: DateTime<Utc>) {
        self.last_used_at = Some(at);
        if ip.is_some() {
            self.last_used_ip = ip;
        }
        self.usage_count = self.usage_count.saturating_add(1);
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }
}
