//! API Key repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::entity::{ApiKey, ApiKeyId, Revocation};
use crate::domain::tenant::TenantId;
use crate::domain::DomainError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Listing filter. Listing is always bound to one tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiKeyFilter {
    pub tenant_id: TenantId,
    pub active: Option<bool>,
    pub search: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl ApiKeyFilter {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            active: None,
            search: None,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_active(mut self, active: Option<bool>) -> Self {
        self.active = active;
        self
    }

    /// Blank search terms are ignored
    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    /// Page numbers start at 1; the page size is clamped to 1..=100
    pub fn with_page(mut self, page: Option<u32>, limit: Option<u32>) -> Self {
        self.page = page.unwrap_or(1).max(1);
        self.limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Whether a key passes the active and search criteria (tenant is checked separately)
    pub fn matches(&self, key: &ApiKey) -> bool {
        if let Some(active) = self.active {
            if key.is_active() != active {
                return false;
            }
        }

        match &self.search {
            Some(term) => {
                let term = term.to_lowercase();
                key.name().to_lowercase().contains(&term)
                    || key.key_prefix().to_lowercase().contains(&term)
                    || key
                        .description()
                        .is_some_and(|d| d.to_lowercase().contains(&term))
            }
            None => true,
        }
    }
}

/// One page of keys plus the total matching the filter
#[derive(Debug, Clone)]
pub struct ApiKeyPage {
    pub items: Vec<ApiKey>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

/// Repository trait for API key storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiKeyRepository: Send + Sync + Debug {
    /// Persist a newly issued key; fails with a conflict if the id or hash exists
    async fn create(&self, api_key: &ApiKey) -> Result<(), DomainError>;

    /// Get a key by ID within a tenant
    async fn get(&self, tenant_id: &TenantId, id: &ApiKeyId)
    -> Result<Option<ApiKey>, DomainError>;

    /// Authentication lookup: hash match on an active, unrevoked key
    async fn find_active_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DomainError>;

    /// Persist the mutable fields of a key (name, description, ceiling, expiry, active flag)
    async fn update(&self, api_key: &ApiKey) -> Result<(), DomainError>;

    /// Record a revocation unless one is already stored. Returns false if the key was
    /// already revoked or no longer exists.
    async fn revoke(&self, id: &ApiKeyId, revocation: &Revocation) -> Result<bool, DomainError>;

    /// Stamp last use and bump the usage counter
    async fn record_usage(
        &self,
        id: &ApiKeyId,
        ip: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError>;

    /// Hard delete within a tenant
    async fn delete(&self, tenant_id: &TenantId, id: &ApiKeyId) -> Result<bool, DomainError>;

    /// List keys of one tenant, newest first
    async fn list(&self, filter: &ApiKeyFilter) -> Result<ApiKeyPage, DomainError>;

    /// Round trip to the backing store
    async fn ping(&self) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(name: &str, description: Option<&str>) -> ApiKey {
        ApiKey::new(
            ApiKeyId::generate(),
            name,
            "sha256$00",
            "kg_live_Qx7rT2mA",
            TenantId::new("acme").unwrap(),
            "admin-1",
            Utc::now(),
        )
        .with_description(description.map(String::from))
    }

    #[test]
    fn test_filter_pagination_clamps() {
        let tenant = TenantId::new("acme").unwrap();

        let filter = ApiKeyFilter::new(tenant.clone()).with_page(Some(0), Some(500));
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, MAX_PAGE_SIZE);
        assert_eq!(filter.offset(), 0);

        let filter = ApiKeyFilter::new(tenant).with_page(Some(3), Some(10));
        assert_eq!(filter.offset(), 20);
    }

    #[test]
    fn test_filter_search_is_case_insensitive() {
        let filter = ApiKeyFilter::new(TenantId::new("acme").unwrap())
            .with_search(Some("EXPORT".to_string()));

        assert!(filter.matches(&test_key("Nightly export", None)));
        assert!(filter.matches(&test_key("BI", Some("used by the export job"))));
        assert!(!filter.matches(&test_key("Dashboard", None)));
    }

    #[test]
    fn test_filter_search_matches_prefix() {
        let filter = ApiKeyFilter::new(TenantId::new("acme").unwrap())
            .with_search(Some("qx7r".to_string()));
        assert!(filter.matches(&test_key("Dashboard", None)));
    }

    #[test]
    fn test_filter_blank_search_ignored() {
        let filter =
            ApiKeyFilter::new(TenantId::new("acme").unwrap()).with_search(Some("  ".to_string()));
        assert_eq!(filter.search, None);
    }

    #[test]
    fn test_filter_active() {
        let mut revoked = test_key("Old", None);
        revoked.revoke("admin-1", None, Utc::now()).unwrap();
        let active = test_key("New", None);

        let filter = ApiKeyFilter::new(TenantId::new("acme").unwrap()).with_active(Some(true));
        assert!(filter.matches(&active));
        assert!(!filter.matches(&revoked));
    }
}
