//! In-memory usage ledger

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::api_key::ApiKeyId;
use crate::domain::usage::{UsageLogEntry, UsageQuery, UsageRepository, UsageStats};
use crate::domain::DomainError;

/// In-memory usage repository
#[derive(Debug, Default)]
pub struct InMemoryUsageRepository {
    entries: RwLock<Vec<UsageLogEntry>>,
}

impl InMemoryUsageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries across all keys
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl UsageRepository for InMemoryUsageRepository {
    async fn append(&self, entry: &UsageLogEntry) -> Result<(), DomainError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn count_since(
        &self,
        api_key_id: &ApiKeyId,
        since: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let entries = self.entries.read().await;

        Ok(entries
            .iter()
            .filter(|e| e.api_key_id() == api_key_id && e.created_at() >= since)
            .count() as u64)
    }

    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageLogEntry>, DomainError> {
        let entries = self.entries.read().await;

        let mut matching: Vec<&UsageLogEntry> =
            entries.iter().filter(|e| query.matches(e)).collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        Ok(matching
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.effective_limit())
            .cloned()
            .collect())
    }

    async fn stats(&self, query: &UsageQuery) -> Result<UsageStats, DomainError> {
        let entries = self.entries.read().await;

        let mut stats = UsageStats::new();
        for entry in entries.iter().filter(|e| query.matches(e)) {
            stats.add_entry(entry);
        }

        Ok(stats)
    }

    async fn delete_by_api_key(&self, api_key_id: &ApiKeyId) -> Result<u64, DomainError> {
        let mut entries = self.entries.write().await;

        let before = entries.len();
        entries.retain(|e| e.api_key_id() != api_key_id);

        Ok((before - entries.len()) as u64)
    }
}
