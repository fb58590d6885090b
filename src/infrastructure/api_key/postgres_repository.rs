//! PostgreSQL API key repository implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::domain::api_key::{
    ApiKey, ApiKeyFilter, ApiKeyId, ApiKeyPage, ApiKeyRecord, ApiKeyRepository, Revocation,
};
use crate::domain::{DomainError, TenantId};

const SELECT_COLUMNS: &str = r#"
    id, name, description, key_hash, key_prefix, tenant_id, created_by, rate_limit,
    expires_at, last_used_at, last_used_ip, usage_count, is_active,
    revoked_at, revoked_by, revoked_reason, created_at, updated_at
"#;

/// PostgreSQL implementation of ApiKeyRepository
#[derive(Debug, Clone)]
pub struct PostgresApiKeyRepository {
    pool: PgPool,
}

impl PostgresApiKeyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepository for PostgresApiKeyRepository {
    async fn create(&self, api_key: &ApiKey) -> Result<(), DomainError> {
        let rate_limit = i32::try_from(api_key.rate_limit())
            .map_err(|_| DomainError::validation("Rate limit is too large"))?;

        sqlx::query(
            r#"
            INSERT INTO api_keys (
                id, name, description, key_hash, key_prefix, tenant_id, created_by,
                rate_limit, expires_at, usage_count, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10, $11, $12)
            "#,
        )
        .bind(api_key.id().as_uuid())
        .bind(api_key.name())
        .bind(api_key.description())
        .bind(api_key.key_hash())
        .bind(api_key.key_prefix())
        .bind(api_key.tenant_id().as_str())
        .bind(api_key.created_by())
        .bind(rate_limit)
        .bind(api_key.expires_at())
        .bind(api_key.is_active())
        .bind(api_key.created_at())
        .bind(api_key.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DomainError::conflict("API key already exists")
            } else {
                DomainError::storage(format!("Failed to create API key: {}", e))
            }
        })?;

        Ok(())
    }

    async fn get(
        &self,
        tenant_id: &TenantId,
        id: &ApiKeyId,
    ) -> Result<Option<ApiKey>, DomainError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM api_keys WHERE id = $1 AND tenant_id = $2",
            SELECT_COLUMNS
        ))
        .bind(id.as_uuid())
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to get API key: {}", e)))?;

        row.as_ref().map(row_to_api_key).transpose()
    }

    async fn find_active_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, DomainError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM api_keys WHERE key_hash = $1 AND is_active = TRUE AND revoked_at IS NULL",
            SELECT_COLUMNS
        ))
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to look up API key: {}", e)))?;

        row.as_ref().map(row_to_api_key).transpose()
    }

    async fn update(&self, api_key: &ApiKey) -> Result<(), DomainError> {
        let rate_limit = i32::try_from(api_key.rate_limit())
            .map_err(|_| DomainError::validation("Rate limit is too large"))?;

        // A revoked row stays inactive whatever the caller sends.
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET name = $2,
                description = $3,
                rate_limit = $4,
                expires_at = $5,
                is_active = $6 AND revoked_at IS NULL,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(api_key.id().as_uuid())
        .bind(api_key.name())
        .bind(api_key.description())
        .bind(rate_limit)
        .bind(api_key.expires_at())
        .bind(api_key.is_active())
        .bind(api_key.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to update API key: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!(
                "API key '{}' not found",
                api_key.id()
            )));
        }

        Ok(())
    }

    async fn revoke(&self, id: &ApiKeyId, revocation: &Revocation) -> Result<bool, DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE api_keys
            SET is_active = FALSE,
                revoked_at = $2,
                revoked_by = $3,
                revoked_reason = $4,
                updated_at = $2
            WHERE id = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(id.as_uuid())
        .bind(revocation.revoked_at)
        .bind(&revocation.revoked_by)
        .bind(revocation.reason.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to revoke API key: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_usage(
        &self,
        id: &ApiKeyId,
        ip: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            UPDATE api_keys
            SET last_used_at = $2,
                last_used_ip = COALESCE($3, last_used_ip),
                usage_count = usage_count + 1
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(at)
        .bind(ip)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to record API key usage: {}", e)))?;

        Ok(())
    }

    async fn delete(&self, tenant_id: &TenantId, id: &ApiKeyId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM api_keys WHERE id = $1 AND tenant_id = $2")
            .bind(id.as_uuid())
            .bind(tenant_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete API key: {}", e)))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &ApiKeyFilter) -> Result<ApiKeyPage, DomainError> {
        let search = filter.search.as_ref().map(|s| format!("%{}%", escape_like(s)));
        let offset = i64::try_from(filter.offset())
            .map_err(|_| DomainError::validation("Page is out of range"))?;

        const WHERE_CLAUSE: &str = r#"
            WHERE tenant_id = $1
              AND ($2::BOOLEAN IS NULL OR (is_active AND revoked_at IS NULL) = $2)
              AND ($3::TEXT IS NULL
                   OR name ILIKE $3
                   OR description ILIKE $3
                   OR key_prefix ILIKE $3)
        "#;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM api_keys {}", WHERE_CLAUSE))
            .bind(filter.tenant_id.as_str())
            .bind(filter.active)
            .bind(search.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to count API keys: {}", e)))?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM api_keys {} ORDER BY created_at DESC, id LIMIT $4 OFFSET $5",
            SELECT_COLUMNS, WHERE_CLAUSE
        ))
        .bind(filter.tenant_id.as_str())
        .bind(filter.active)
        .bind(search.as_deref())
        .bind(i64::from(filter.limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to list API keys: {}", e)))?;

        let items = rows
            .iter()
            .map(row_to_api_key)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ApiKeyPage {
            items,
            total: u64::try_from(total).unwrap_or(0),
            page: filter.page,
            limit: filter.limit,
        })
    }

    async fn ping(&self) -> Result<(), DomainError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Database ping failed: {}", e)))?;

        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Escape LIKE wildcards in user-supplied search terms
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn row_to_api_key(row: &sqlx::postgres::PgRow) -> Result<ApiKey, DomainError> {
    let id: uuid::Uuid = row.get("id");
    let tenant_id: String = row.get("tenant_id");
    let rate_limit: i32 = row.get("rate_limit");
    let usage_count: i64 = row.get("usage_count");
    let revoked_at: Option<DateTime<Utc>> = row.get("revoked_at");
    let revoked_by: Option<String> = row.get("revoked_by");

    let tenant_id = TenantId::new(tenant_id)
        .map_err(|e| DomainError::storage(format!("Invalid tenant ID in database: {}", e)))?;

    let revocation = revoked_at.map(|revoked_at| Revocation {
        revoked_at,
        revoked_by: revoked_by.unwrap_or_default(),
        reason: row.get("revoked_reason"),
    });

    Ok(ApiKey::from_record(ApiKeyRecord {
        id: ApiKeyId::from_uuid(id),
        name: row.get("name"),
        description: row.get("description"),
        key_hash: row.get("key_hash"),
        key_prefix: row.get("key_prefix"),
        tenant_id,
        created_by: row.get("created_by"),
        rate_limit: u32::try_from(rate_limit)
            .map_err(|_| DomainError::storage("Negative rate limit in database"))?,
        expires_at: row.get("expires_at"),
        last_used_at: row.get("last_used_at"),
        last_used_ip: row.get("last_used_ip"),
        usage_count: u64::try_from(usage_count).unwrap_or(0),
        is_active: row.get("is_active"),
        revocation,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }))
}
