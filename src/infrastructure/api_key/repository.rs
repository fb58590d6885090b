//! In-memory API key repository implementation

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::api_key::{
    ApiKey, ApiKeyFilter, ApiKeyId, ApiKeyPage, ApiKeyRepository, Revocation,
};
use crate::domain::{DomainError, TenantId};

#[derive(Debug, Default)]
struct KeyTable {
    keys: HashMap<ApiKeyId, ApiKey>,
    hash_index: HashMap<String, ApiKeyId>,
}

/// In-memory implementation of ApiKeyRepository
#[derive(Debug, Default)]
pub struct InMemoryApiKeyRepository {
    table: RwLock<KeyTable>,
}

impl InMemoryApiKeyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ApiKeyRepository for InMemoryApiKeyRepository {
    async fn create(&self, api_key: &ApiKey) -> Result<(), DomainError> {
        let mut table = self.table.write().await;

        if table.keys.contains_key(api_key.id()) {
            return Err(DomainError::conflict(format!(
                "API key with ID '{}' already exists",
                api_key.id()
            )));
        }

        if table.hash_index.contains_key(api_key.key_hash()) {
            return Err(DomainError::conflict("API key hash already exists"));
        }

        table
            .hash_index
            .insert(api_key.key_hash().to_string(), *api_key.id());
        table.keys.insert(*api_key.id(), api_key.clone());

        Ok(())
    }

    async fn get(
        &self,
        tenant_id: &TenantId,
        id: &ApiKeyId,
    ) -> Result<Option<ApiKey>, DomainError> {
        let table = self.table.read().await;

        Ok(table
            .keys
            .get(id)
            .filter(|k| k.tenant_id() == tenant_id)
            .cloned())
    }

    async fn find_active_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DomainError> {
        let table = self.table.read().await;

        Ok(table
            .hash_index
            .get(key_hash)
            .and_then(|id| table.keys.get(id))
            .filter(|k| k.is_active() && !k.is_revoked())
            .cloned())
    }

    async fn update(&self, api_key: &ApiKey) -> Result<(), DomainError> {
        let mut table = self.table.write().await;

        let stored = table
            .keys
            .get_mut(api_key.id())
            .ok_or_else(|| DomainError::not_found(format!("API key '{}' not found", api_key.id())))?;

        // Only the mutable columns are taken from the caller.
        let incoming = api_key.to_record();
        let mut record = stored.to_record();
        record.name = incoming.name;
        record.description = incoming.description;
        record.rate_limit = incoming.rate_limit;
        record.expires_at = incoming.expires_at;
        record.is_active = incoming.is_active;
        record.updated_at = incoming.updated_at;

        *stored = ApiKey::from_record(record);
        Ok(())
    }

    async fn revoke(&self, id: &ApiKeyId, revocation: &Revocation) -> Result<bool, DomainError> {
        let mut table = self.table.write().await;

        let Some(stored) = table.keys.get_mut(id) else {
            return Ok(false);
        };

        if stored.is_revoked() {
            return Ok(false);
        }

        let mut record = stored.to_record();
        record.is_active = false;
        record.revocation = Some(revocation.clone());
        record.updated_at = revocation.revoked_at;
        *stored = ApiKey::from_record(record);

        Ok(true)
    }

    async fn record_usage(
        &self,
        id: &ApiKeyId,
        ip: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let mut table = self.table.write().await;

        if let Some(stored) = table.keys.get_mut(id) {
            stored.record_usage(ip, at);
        }

        Ok(())
    }

    async fn delete(&self, tenant_id: &TenantId, id: &ApiKeyId) -> Result<bool, DomainError> {
        let mut table = self.table.write().await;

        let owned = table
            .keys
            .get(id)
            .is_some_and(|k| k.tenant_id() == tenant_id);
        if !owned {
            return Ok(false);
        }

        if let Some(removed) = table.keys.remove(id) {
            table.hash_index.remove(removed.key_hash());
        }

        Ok(true)
    }

    async fn list(&self, filter: &ApiKeyFilter) -> Result<ApiKeyPage, DomainError> {
        let table = self.table.read().await;

        let mut matching: Vec<&ApiKey> = table
            .keys
            .values()
            .filter(|k| k.tenant_id() == &filter.tenant_id && filter.matches(k))
            .collect();
        matching.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
            .take(filter.limit as usize)
            .cloned()
            .collect();

        Ok(ApiKeyPage {
            items,
            total,
            page: filter.page,
            limit: filter.limit,
        })
    }

    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::api_key::ApiKeyUpdate;

    fn tenant(id: &str) -> TenantId {
        TenantId::new(id).unwrap()
    }

    fn create_test_api_key(name: &str, tenant_id: &str, hash: &str) -> ApiKey {
        ApiKey::new(
            ApiKeyId::generate(),
            name,
            hash,
            "kg_live_abcdefgh",
            tenant(tenant_id),
            "admin-1",
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_scoped_to_tenant() {
        let repo = InMemoryApiKeyRepository::new();
        let key = create_test_api_key("Exports", "acme", "sha256$01");
        repo.create(&key).await.unwrap();

        let found = repo.get(&tenant("acme"), key.id()).await.unwrap();
        assert_eq!(found.as_ref().map(|k| k.name()), Some("Exports"));

        let other = repo.get(&tenant("globex"), key.id()).await.unwrap();
        assert!(other.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let repo = InMemoryApiKeyRepository::new();
        repo.create(&create_test_api_key("One", "acme", "sha256$01"))
            .await
            .unwrap();

        let result = repo
            .create(&create_test_api_key("Two", "globex", "sha256$01"))
            .await;
        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_find_active_by_hash_skips_revoked_and_disabled() {
        let repo = InMemoryApiKeyRepository::new();
        let active = create_test_api_key("Active", "acme", "sha256$01");
        let revoked = create_test_api_key("Revoked", "acme", "sha256$02");
        let mut disabled = create_test_api_key("Disabled", "acme", "sha256$03");
        repo.create(&active).await.unwrap();
        repo.create(&revoked).await.unwrap();
        repo.create(&disabled).await.unwrap();

        let revocation = Revocation {
            revoked_at: Utc::now(),
            revoked_by: "admin-1".to_string(),
            reason: None,
        };
        assert!(repo.revoke(revoked.id(), &revocation).await.unwrap());

        disabled
            .apply_update(
                ApiKeyUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        repo.update(&disabled).await.unwrap();

        assert!(repo.find_active_by_hash("sha256$01").await.unwrap().is_some());
        assert!(repo.find_active_by_hash("sha256$02").await.unwrap().is_none());
        assert!(repo.find_active_by_hash("sha256$03").await.unwrap().is_none());
        assert!(repo.find_active_by_hash("sha256$99").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_only_once() {
        let repo = InMemoryApiKeyRepository::new();
        let key = create_test_api_key("Exports", "acme", "sha256$01");
        repo.create(&key).await.unwrap();

        let first = Revocation {
            revoked_at: Utc::now(),
            revoked_by: "admin-1".to_string(),
            reason: Some("rotated".to_string()),
        };
        let second = Revocation {
            revoked_at: Utc::now() + Duration::minutes(5),
            revoked_by: "admin-2".to_string(),
            reason: None,
        };

        assert!(repo.revoke(key.id(), &first).await.unwrap());
        assert!(!repo.revoke(key.id(), &second).await.unwrap());

        let stored = repo.get(&tenant("acme"), key.id()).await.unwrap().unwrap();
        assert_eq!(stored.revocation(), Some(&first));
    }

    #[tokio::test]
    async fn test_update_keeps_immutable_fields() {
        let repo = InMemoryApiKeyRepository::new();
        let key = create_test_api_key("Exports", "acme", "sha256$01");
        repo.create(&key).await.unwrap();
        repo.record_usage(key.id(), Some("10.0.0.1".to_string()), Utc::now())
            .await
            .unwrap();

        // A stale copy must not roll back usage counters.
        let mut stale = key.clone();
        stale
            .apply_update(
                ApiKeyUpdate {
                    name: Some("Renamed".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        repo.update(&stale).await.unwrap();

        let stored = repo.get(&tenant("acme"), key.id()).await.unwrap().unwrap();
        assert_eq!(stored.name(), "Renamed");
        assert_eq!(stored.usage_count(), 1);
        assert_eq!(stored.last_used_ip(), Some("10.0.0.1"));
        assert_eq!(stored.key_hash(), "sha256$01");
    }

    #[tokio::test]
    async fn test_update_missing_key() {
        let repo = InMemoryApiKeyRepository::new();
        let key = create_test_api_key("Exports", "acme", "sha256$01");

        let result = repo.update(&key).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_scoped_to_tenant() {
        let repo = InMemoryApiKeyRepository::new();
        let key = create_test_api_key("Exports", "acme", "sha256$01");
        repo.create(&key).await.unwrap();

        assert!(!repo.delete(&tenant("globex"), key.id()).await.unwrap());
        assert!(repo.delete(&tenant("acme"), key.id()).await.unwrap());
        assert!(!repo.delete(&tenant("acme"), key.id()).await.unwrap());
        assert!(repo.find_active_by_hash("sha256$01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_paginates_within_tenant() {
        let repo = InMemoryApiKeyRepository::new();
        for i in 0..5 {
            let key = create_test_api_key(&format!("Key {}", i), "acme", &format!("sha256$a{}", i));
            repo.create(&key).await.unwrap();
        }
        repo.create(&create_test_api_key("Foreign", "globex", "sha256$b0"))
            .await
            .unwrap();

        let filter = ApiKeyFilter::new(tenant("acme")).with_page(Some(2), Some(2));
        let page = repo.list(&filter).await.unwrap();

        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert!(page.items.iter().all(|k| k.tenant_id().as_str() == "acme"));

        let filter = ApiKeyFilter::new(tenant("acme")).with_page(Some(3), Some(2));
        assert_eq!(repo.list(&filter).await.unwrap().items.len(), 1);
    }
}
