//! API Key service
//!
//! Administrative lifecycle of API keys. Every operation acts within one tenant.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::domain::api_key::{
    ApiKey, ApiKeyFilter, ApiKeyId, ApiKeyPage, ApiKeyRepository, ApiKeyUpdate,
    DEFAULT_RATE_LIMIT, validate_api_key_name, validate_description, validate_expiry,
    validate_rate_limit,
};
use crate::domain::usage::{UsageLogEntry, UsageQuery, UsageRepository, UsageStats};
use crate::domain::{Clock, DomainError, TenantId};

use super::generator::ApiKeyGenerator;

/// Input for issuing a key
#[derive(Debug, Clone, Default)]
pub struct NewApiKey {
    pub name: String,
    pub description: Option<String>,
    pub rate_limit: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of creating a new API key
#[derive(Debug)]
pub struct CreateApiKeyResult {
    /// The stored key (hash only)
    pub api_key: ApiKey,
    /// The full secret key (only returned once)
    pub secret: String,
}

/// Result of a hard delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteApiKeyResult {
    pub id: ApiKeyId,
    pub usage_entries_removed: u64,
}

/// API Key service for managing API keys
#[derive(Debug)]
pub struct ApiKeyService {
    repository: Arc<dyn ApiKeyRepository>,
    usage: Arc<dyn UsageRepository>,
    generator: ApiKeyGenerator,
    clock: Arc<dyn Clock>,
    default_rate_limit: u32,
}

impl ApiKeyService {
    pub fn new(
        repository: Arc<dyn ApiKeyRepository>,
        usage: Arc<dyn UsageRepository>,
        generator: ApiKeyGenerator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            usage,
            generator,
            clock,
            default_rate_limit: DEFAULT_RATE_LIMIT,
        }
    }

    /// Ceiling given to keys created without one
    pub fn with_default_rate_limit(mut self, rate_limit: u32) -> Self {
        self.default_rate_limit = rate_limit;
        self
    }

    /// Issue a new key. The plaintext secret is only available in the returned value.
    pub async fn create(
        &self,
        tenant_id: &TenantId,
        actor: &str,
        request: NewApiKey,
    ) -> Result<CreateApiKeyResult, DomainError> {
        let now = self.clock.now();
        let rate_limit = request.rate_limit.unwrap_or(self.default_rate_limit);

        validate_api_key_name(&request.name)?;
        validate_description(request.description.as_deref())?;
        validate_rate_limit(rate_limit)?;
        validate_expiry(request.expires_at, now)?;

        let generated = self.generator.generate();
        let api_key = ApiKey::new(
            ApiKeyId::generate(),
            request.name.trim(),
            generated.hash,
            generated.prefix,
            tenant_id.clone(),
            actor,
            now,
        )
        .with_description(request.description)
        .with_rate_limit(rate_limit)
        .with_expiration(request.expires_at);

        self.repository.create(&api_key).await?;

        info!(
            key_id = %api_key.id(),
            tenant_id = %tenant_id,
            actor = actor,
            prefix = api_key.key_prefix(),
            "API key created"
        );

        Ok(CreateApiKeyResult {
            api_key,
            secret: generated.key,
        })
    }

    /// Get a key of the tenant
    pub async fn get(&self, tenant_id: &TenantId, id: &ApiKeyId) -> Result<ApiKey, DomainError> {
        self.repository
            .get(tenant_id, id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", id)))
    }

    /// Partial update of the mutable fields
    pub async fn update(
        &self,
        tenant_id: &TenantId,
        id: &ApiKeyId,
        update: ApiKeyUpdate,
    ) -> Result<ApiKey, DomainError> {
        let mut key = self.get(tenant_id, id).await?;

        if update.is_empty() {
            return Ok(key);
        }

        key.apply_update(update, self.clock.now())?;
        self.repository.update(&key).await?;

        info!(key_id = %id, tenant_id = %tenant_id, "API key updated");
        Ok(key)
    }

    /// Revoke a key. Revocation is terminal; a second call fails with `AlreadyRevoked`.
    pub async fn revoke(
        &self,
        tenant_id: &TenantId,
        id: &ApiKeyId,
        actor: &str,
        reason: Option<String>,
    ) -> Result<ApiKey, DomainError> {
        let mut key = self.get(tenant_id, id).await?;
        let revocation = key.revoke(actor, reason, self.clock.now())?.clone();

        // Another revoke may have landed between the read and this write.
        if !self.repository.revoke(id, &revocation).await? {
            return Err(DomainError::already_revoked(format!(
                "API key '{}' is already revoked",
                id
            )));
        }

        info!(key_id = %id, tenant_id = %tenant_id, actor = actor, "API key revoked");
        Ok(key)
    }

    /// Hard delete a key together with its usage history
    pub async fn delete(
        &self,
        tenant_id: &TenantId,
        id: &ApiKeyId,
    ) -> Result<DeleteApiKeyResult, DomainError> {
        self.get(tenant_id, id).await?;

        let mut usage_entries_removed = self.usage.delete_by_api_key(id).await?;

        if !self.repository.delete(tenant_id, id).await? {
            warn!(key_id = %id, "API key disappeared during delete");
            return Err(DomainError::not_found(format!("API key '{}' not found", id)));
        }

        // Post-response writes from requests still in flight can land between the
        // first sweep and the key delete. Later ones fail the foreign key in Postgres.
        usage_entries_removed += self.usage.delete_by_api_key(id).await?;

        info!(
            key_id = %id,
            tenant_id = %tenant_id,
            usage_entries_removed,
            "API key deleted"
        );

        Ok(DeleteApiKeyResult {
            id: *id,
            usage_entries_removed,
        })
    }

    /// List keys of the filter's tenant
    pub async fn list(&self, filter: &ApiKeyFilter) -> Result<ApiKeyPage, DomainError> {
        self.repository.list(filter).await
    }

    /// Ledger entries of one key, newest first
    pub async fn usage(
        &self,
        tenant_id: &TenantId,
        id: &ApiKeyId,
        query: UsageQuery,
    ) -> Result<Vec<UsageLogEntry>, DomainError> {
        self.get(tenant_id, id).await?;

        let query = query.with_api_key(*id).with_tenant(tenant_id.clone());
        self.usage.query(&query).await
    }

    /// Aggregated usage of one key
    pub async fn usage_stats(
        &self,
        tenant_id: &TenantId,
        id: &ApiKeyId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<UsageStats, DomainError> {
        self.get(tenant_id, id).await?;

        let query = UsageQuery::new()
            .with_api_key(*id)
            .with_tenant(tenant_id.clone())
            .with_time_range(from, to);
        self.usage.stats(&query).await
    }

    /// Backing store round trip, for readiness checks
    pub async fn ping(&self) -> Result<(), DomainError> {
        self.repository.ping().await
    }
}
