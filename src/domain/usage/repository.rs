//! Usage ledger repository trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use super::{UsageLogEntry, UsageStats};
use crate::domain::api_key::ApiKeyId;
use crate::domain::tenant::TenantId;
use crate::domain::DomainError;

pub const DEFAULT_QUERY_LIMIT: usize = 100;
pub const MAX_QUERY_LIMIT: usize = 1000;

/// Query parameters for ledger entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageQuery {
    /// Filter by API key
    pub api_key_id: Option<ApiKeyId>,
    /// Filter by tenant
    pub tenant_id: Option<TenantId>,
    /// Start timestamp (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// End timestamp (exclusive)
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl UsageQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key_id: ApiKeyId) -> Self {
        self.api_key_id = Some(api_key_id);
        self
    }

    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn with_time_range(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.from = from;
        self.to = to;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Page size actually applied, clamped to 1..=1000
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT)
    }

    /// Whether an entry satisfies every filter
    pub fn matches(&self, entry: &UsageLogEntry) -> bool {
        self.api_key_id.is_none_or(|id| entry.api_key_id() == &id)
            && self
                .tenant_id
                .as_ref()
                .is_none_or(|tenant| entry.tenant_id() == tenant)
            && self.from.is_none_or(|from| entry.created_at() >= from)
            && self.to.is_none_or(|to| entry.created_at() < to)
    }
}

/// Append-only ledger of per-request outcomes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UsageRepository: Send + Sync + Debug {
    /// Append an entry
    async fn append(&self, entry: &UsageLogEntry) -> Result<(), DomainError>;

    /// Count entries for a key created at or after `since`
    async fn count_since(
        &self,
        api_key_id: &ApiKeyId,
        since: DateTime<Utc>,
    ) -> Result<u64, DomainError>;

    /// Query entries, newest first
    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageLogEntry>, DomainError>;

    /// Aggregate entries matching the query (limit and offset are ignored)
    async fn stats(&self, query: &UsageQuery) -> Result<UsageStats, DomainError>;

    /// Remove every entry of a key, returning how many were removed
    async fn delete_by_api_key(&self, api_key_id: &ApiKeyId) -> Result<u64, DomainError>;
}
