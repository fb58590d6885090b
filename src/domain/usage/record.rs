//! Usage ledger entries

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::api_key::{ApiKey, ApiKeyId};
use crate::domain::tenant::TenantId;

/// Unique identifier for a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageLogId(Uuid);

impl UsageLogId {
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

impl std::fmt::Display for UsageLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the gateway knows about an inbound request before it is handled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub endpoint: String,
    pub method: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_size: Option<u64>,
}

impl RequestMetadata {
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.into(),
            ..Default::default()
        }
    }

    pub fn with_ip_address(mut self, ip: Option<String>) -> Self {
        self.ip_address = ip;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_request_size(mut self, size: Option<u64>) -> Self {
        self.request_size = size;
        self
    }
}

/// One immutable ledger entry per processed request attributed to a key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageLogEntry {
    pub(crate) id: UsageLogId,
    pub(crate) api_key_id: ApiKeyId,
    pub(crate) tenant_id: TenantId,
    pub(crate) endpoint: String,
    pub(crate) method: String,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) request_size: Option<u64>,
    pub(crate) response_status: u16,
    pub(crate) response_time_ms: u64,
    pub(crate) error_message: Option<String>,
    pub(crate) created_at: DateTime<Utc>,
}

impl UsageLogEntry {
    /// Build an entry for a request authenticated by `key`.
    ///
    /// The tenant is always taken from the key, never from anything the caller sent.
    pub fn for_key(
        key: &ApiKey,
        request: &RequestMetadata,
        response_status: u16,
        elapsed: Duration,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UsageLogId::generate(),
            api_key_id: *key.id(),
            tenant_id: key.tenant_id().clone(),
            endpoint: request.endpoint.clone(),
            method: request.method.clone(),
            ip_address: request.ip_address.clone(),
            user_agent: request.user_agent.clone(),
            request_size: request.request_size,
            response_status,
            response_time_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            error_message: None,
            created_at,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn id(&self) -> &UsageLogId {
        &self.id
    }

    pub fn api_key_id(&self) -> &ApiKeyId {
        &self.api_key_id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn request_size(&self) -> Option<u64> {
        self.request_size
    }

    pub fn response_status(&self) -> u16 {
        self.response_status
    }

    pub fn response_time_ms(&self) -> u64 {
        self.response_time_ms
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_success(&self) -> bool {
        self.response_status < 400
    }

    pub fn is_rate_limited(&self) -> bool {
        self.response_status == 429
    }
}

/// Aggregated usage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub avg_response_time_ms: f64,
    pub by_endpoint: BTreeMap<String, u64>,
    pub by_status: BTreeMap<u16, u64>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the aggregate
    pub fn add_entry(&mut self, entry: &UsageLogEntry) {
        self.total_requests += 1;

        if entry.is_success() {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        if entry.is_rate_limited() {
            self.rate_limited_requests += 1;
        }

        // Running average
        let prev_total = self.avg_response_time_ms * (self.total_requests - 1) as f64;
        self.avg_response_time_ms =
            (prev_total + entry.response_time_ms as f64) / self.total_requests as f64;

        *self.by_endpoint.entry(entry.endpoint.clone()).or_insert(0) += 1;
        *self.by_status.entry(entry.response_status).or_insert(0) += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(tenant: &str) -> ApiKey {
        ApiKey::new(
            ApiKeyId::generate(),
            "Exports",
            "sha256$00",
            "kg_live_00000000",
            TenantId::new(tenant).unwrap(),
            "admin-1",
            Utc::now(),
        )
    }

    fn entry(key: &ApiKey, endpoint: &str, status: u16, ms: u64) -> UsageLogEntry {
        let request = RequestMetadata::new("GET", endpoint);
        UsageLogEntry::for_key(key, &request, status, Duration::from_millis(ms), Utc::now())
    }

    #[test]
    fn test_entry_is_stamped_with_key_tenant() {
        let key = test_key("acme");
        let request = RequestMetadata::new("GET", "/v1/usage")
            .with_ip_address(Some("10.1.2.3".to_string()))
            .with_user_agent(Some("curl/8.0".to_string()));

        let entry = UsageLogEntry::for_key(
            &key,
            &request,
            200,
            Duration::from_millis(12),
            Utc::now(),
        );

        assert_eq!(entry.tenant_id().as_str(), "acme");
        assert_eq!(entry.api_key_id(), key.id());
        assert_eq!(entry.ip_address(), Some("10.1.2.3"));
        assert_eq!(entry.response_time_ms(), 12);
        assert!(entry.is_success());
    }

    #[test]
    fn test_with_error() {
        let key = test_key("acme");
        let entry = entry(&key, "/v1/session", 429, 1).with_error("Rate limit exceeded");

        assert!(entry.is_rate_limited());
        assert!(!entry.is_success());
        assert_eq!(entry.error_message(), Some("Rate limit exceeded"));
    }

    #[test]
    fn test_stats_aggregation() {
        let key = test_key("acme");
        let mut stats = UsageStats::new();

        stats.add_entry(&entry(&key, "/v1/session", 200, 10));
        stats.add_entry(&entry(&key, "/v1/session", 200, 20));
        stats.add_entry(&entry(&key, "/v1/usage", 429, 30));
        stats.add_entry(&entry(&key, "/v1/usage", 500, 40));

        assert_eq!(stats.total_requests, 4);
        assert_eq!(stats.successful_requests, 2);
        assert_eq!(stats.failed_requests, 2);
        assert_eq!(stats.rate_limited_requests, 1);
        assert!((stats.avg_response_time_ms - 25.0).abs() < f64::EPSILON);
        assert_eq!(stats.by_endpoint.get("/v1/session"), Some(&2));
        assert_eq!(stats.by_status.get(&429), Some(&1));
        assert!((stats.success_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_stats() {
        let stats = UsageStats::new();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.success_rate(), 0.0);
    }
}
