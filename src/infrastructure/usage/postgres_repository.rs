//! PostgreSQL usage ledger

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::domain::api_key::ApiKeyId;
use crate::domain::usage::{UsageLogEntry, UsageLogId, UsageQuery, UsageRepository, UsageStats};
use crate::domain::{DomainError, TenantId};

const QUERY_FILTER: &str = r#"
    WHERE ($1::UUID IS NULL OR api_key_id = $1)
      AND ($2::TEXT IS NULL OR tenant_id = $2)
      AND ($3::TIMESTAMPTZ IS NULL OR created_at >= $3)
      AND ($4::TIMESTAMPTZ IS NULL OR created_at < $4)
"#;

/// PostgreSQL implementation of UsageRepository
#[derive(Debug, Clone)]
pub struct PostgresUsageRepository {
    pool: PgPool,
}

impl PostgresUsageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for PostgresUsageRepository {
    async fn append(&self, entry: &UsageLogEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO api_key_usage_logs (
                id, api_key_id, tenant_id, endpoint, method, ip_address, user_agent,
                request_size, response_status, response_time_ms, error_message, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id().as_uuid())
        .bind(entry.api_key_id().as_uuid())
        .bind(entry.tenant_id().as_str())
        .bind(entry.endpoint())
        .bind(entry.method())
        .bind(entry.ip_address())
        .bind(entry.user_agent())
        .bind(entry.request_size().and_then(|s| i64::try_from(s).ok()))
        .bind(i32::from(entry.response_status()))
        .bind(i64::try_from(entry.response_time_ms()).unwrap_or(i64::MAX))
        .bind(entry.error_message())
        .bind(entry.created_at())
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to append usage log: {}", e)))?;

        Ok(())
    }

    async fn count_since(
        &self,
        api_key_id: &ApiKeyId,
        since: DateTime<Utc>,
    ) -> Result<u64, DomainError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM api_key_usage_logs WHERE api_key_id = $1 AND created_at >= $2",
        )
        .bind(api_key_id.as_uuid())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to count usage logs: {}", e)))?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn query(&self, query: &UsageQuery) -> Result<Vec<UsageLogEntry>, DomainError> {
        let limit = i64::try_from(query.effective_limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset.unwrap_or(0)).unwrap_or(i64::MAX);

        let rows = sqlx::query(&format!(
            r#"
            SELECT id, api_key_id, tenant_id, endpoint, method, ip_address, user_agent,
                   request_size, response_status, response_time_ms, error_message, created_at
            FROM api_key_usage_logs
            {}
            ORDER BY created_at DESC, id
            LIMIT $5 OFFSET $6
            "#,
            QUERY_FILTER
        ))
        .bind(query.api_key_id.as_ref().map(|id| *id.as_uuid()))
        .bind(query.tenant_id.as_ref().map(|t| t.as_str()))
        .bind(query.from)
        .bind(query.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to query usage logs: {}", e)))?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn stats(&self, query: &UsageQuery) -> Result<UsageStats, DomainError> {
        let totals = sqlx::query(&format!(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE response_status < 400) AS successful,
                   COUNT(*) FILTER (WHERE response_status = 429) AS rate_limited,
                   COALESCE(AVG(response_time_ms), 0)::FLOAT8 AS avg_ms
            FROM api_key_usage_logs
            {}
            "#,
            QUERY_FILTER
        ))
        .bind(query.api_key_id.as_ref().map(|id| *id.as_uuid()))
        .bind(query.tenant_id.as_ref().map(|t| t.as_str()))
        .bind(query.from)
        .bind(query.to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to aggregate usage logs: {}", e)))?;

        let breakdown = sqlx::query(&format!(
            r#"
            SELECT endpoint, response_status, COUNT(*) AS requests
            FROM api_key_usage_logs
            {}
            GROUP BY endpoint, response_status
            "#,
            QUERY_FILTER
        ))
        .bind(query.api_key_id.as_ref().map(|id| *id.as_uuid()))
        .bind(query.tenant_id.as_ref().map(|t| t.as_str()))
        .bind(query.from)
        .bind(query.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DomainError::storage(format!("Failed to aggregate usage logs: {}", e)))?;

        let total: i64 = totals.get("total");
        let successful: i64 = totals.get("successful");
        let rate_limited: i64 = totals.get("rate_limited");

        let mut by_endpoint = BTreeMap::new();
        let mut by_status = BTreeMap::new();
        for row in &breakdown {
            let endpoint: String = row.get("endpoint");
            let status: i32 = row.get("response_status");
            let requests = u64::try_from(row.get::<i64, _>("requests")).unwrap_or(0);

            *by_endpoint.entry(endpoint).or_insert(0) += requests;
            if let Ok(status) = u16::try_from(status) {
                *by_status.entry(status).or_insert(0) += requests;
            }
        }

        let total = u64::try_from(total).unwrap_or(0);
        let successful = u64::try_from(successful).unwrap_or(0);

        Ok(UsageStats {
            total_requests: total,
            successful_requests: successful,
            failed_requests: total.saturating_sub(successful),
            rate_limited_requests: u64::try_from(rate_limited).unwrap_or(0),
            avg_response_time_ms: totals.get("avg_ms"),
            by_endpoint,
            by_status,
        })
    }

    async fn delete_by_api_key(&self, api_key_id: &ApiKeyId) -> Result<u64, DomainError> {
        let result = sqlx::query("DELETE FROM api_key_usage_logs WHERE api_key_id = $1")
            .bind(api_key_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| DomainError::storage(format!("Failed to delete usage logs: {}", e)))?;

        Ok(result.rows_affected())
    }
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<UsageLogEntry, DomainError> {
    let id: uuid::Uuid = row.get("id");
    let api_key_id: uuid::Uuid = row.get("api_key_id");
    let tenant_id: String = row.get("tenant_id");
    let request_size: Option<i64> = row.get("request_size");
    let response_status: i32 = row.get("response_status");
    let response_time_ms: i64 = row.get("response_time_ms");

    let tenant_id = TenantId::new(tenant_id)
        .map_err(|e| DomainError::storage(format!("Invalid tenant ID in database: {}", e)))?;
    let response_status = u16::try_from(response_status)
        .map_err(|_| DomainError::storage("Invalid response status in database"))?;

    Ok(UsageLogEntry {
        id: UsageLogId::from_uuid(id),
        api_key_id: ApiKeyId::from_uuid(api_key_id),
        tenant_id,
        endpoint: row.get("endpoint"),
        method: row.get("method"),
        ip_address: row.get("ip_address"),
        user_agent: row.get("user_agent"),
        request_size: request_size.and_then(|s| u64::try_from(s).ok()),
        response_status,
        response_time_ms: u64::try_from(response_time_ms).unwrap_or(0),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_filter_binds_every_parameter() {
        for placeholder in ["$1", "$2", "$3", "$4"] {
            assert!(QUERY_FILTER.contains(placeholder));
        }
    }
}
