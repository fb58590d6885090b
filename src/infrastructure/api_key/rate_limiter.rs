//! Rate limiter implementation
//!
//! Fixed hourly windows counted from the usage ledger. The window starts at minute 0
//! of the current wall-clock hour; usage is the number of ledger entries for the key
//! since then. No counter is kept in memory.
//!
//! Two concurrent requests on the same key can both read a count below the ceiling
//! before either entry lands, so a key may briefly exceed its ceiling under load.

use std::sync::Arc;

use chrono::{DateTime, Duration, DurationRound, Utc};

use crate::domain::api_key::ApiKey;
use crate::domain::usage::UsageRepository;
use crate::domain::{DomainError, RateLimitDecision};

/// Start of the hourly window containing `now`
pub fn window_start(now: DateTime<Utc>) -> Result<DateTime<Utc>, DomainError> {
    now.duration_trunc(Duration::hours(1))
        .map_err(|e| DomainError::internal(format!("Failed to compute rate window: {}", e)))
}

/// Pure window arithmetic. One slot is reserved for the request being decided.
pub fn decide(ceiling: u32, usage: u64, window_start: DateTime<Utc>) -> RateLimitDecision {
    let ceiling_wide = u64::from(ceiling);
    let remaining = ceiling_wide.saturating_sub(usage).saturating_sub(1);

    RateLimitDecision {
        allowed: usage < ceiling_wide,
        limit: ceiling,
        remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
        reset_time: window_start + Duration::hours(1),
    }
}

/// Ledger-backed rate limiter for API keys
#[derive(Debug, Clone)]
pub struct RateLimiter {
    usage: Arc<dyn UsageRepository>,
}

impl RateLimiter {
    pub fn new(usage: Arc<dyn UsageRepository>) -> Self {
        Self { usage }
    }

    /// Decide whether `key` may make another request at `now`, using its stored ceiling
    pub async fn check(
        &self,
        key: &ApiKey,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, DomainError> {
        let start = window_start(now)?;
        let usage = self.usage.count_since(key.id(), start).await?;

        Ok(decide(key.rate_limit(), usage, start))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::TimeZone;

    use super::*;
    use crate::domain::api_key::ApiKeyId;
    use crate::domain::usage::{RequestMetadata, UsageLogEntry};
    use crate::domain::TenantId;
    use crate::infrastructure::usage::InMemoryUsageRepository;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 14, h, m, s).unwrap()
    }

    fn key_with_ceiling(ceiling: u32) -> ApiKey {
        ApiKey::new(
            ApiKeyId::generate(),
            "Exports",
            "sha256$00",
            "kg_live_00000000",
            TenantId::new("acme").unwrap(),
            "admin-1",
            at(0, 0, 0),
        )
        .with_rate_limit(ceiling)
    }

    async fn log_at(repo: &InMemoryUsageRepository, key: &ApiKey, when: DateTime<Utc>) {
        let entry = UsageLogEntry::for_key(
            key,
            &RequestMetadata::new("GET", "/v1/session"),
            200,
            StdDuration::from_millis(5),
            when,
        );
        repo.append(&entry).await.unwrap();
    }

    #[test]
    fn test_window_start_truncates_to_hour() {
        assert_eq!(window_start(at(10, 59, 59)).unwrap(), at(10, 0, 0));
        assert_eq!(window_start(at(11, 0, 0)).unwrap(), at(11, 0, 0));
    }

    #[test]
    fn test_decide() {
        let start = at(10, 0, 0);

        let first = decide(3, 0, start);
        assert!(first.allowed);
        assert_eq!(first.remaining, 2);
        assert_eq!(first.reset_time, at(11, 0, 0));

        let last = decide(3, 2, start);
        assert!(last.allowed);
        assert_eq!(last.remaining, 0);

        let over = decide(3, 3, start);
        assert!(!over.allowed);
        assert_eq!(over.remaining, 0);

        let way_over = decide(3, 40, start);
        assert!(!way_over.allowed);
        assert_eq!(way_over.remaining, 0);
    }

    #[tokio::test]
    async fn test_fourth_request_blocked_then_next_window_resets() {
        let repo = Arc::new(InMemoryUsageRepository::new());
        let limiter = RateLimiter::new(repo.clone());
        let key = key_with_ceiling(3);

        for minute in [5, 20, 40] {
            log_at(&repo, &key, at(10, minute, 0)).await;
        }

        let decision = limiter.check(&key, at(10, 45, 0)).await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.limit, 3);
        assert_eq!(decision.reset_time, at(11, 0, 0));

        let decision = limiter.check(&key, at(11, 0, 1)).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_time, at(12, 0, 0));
    }

    #[tokio::test]
    async fn test_entries_of_previous_window_ignored() {
        let repo = Arc::new(InMemoryUsageRepository::new());
        let limiter = RateLimiter::new(repo.clone());
        let key = key_with_ceiling(2);

        log_at(&repo, &key, at(9, 59, 59)).await;
        log_at(&repo, &key, at(9, 30, 0)).await;

        let decision = limiter.check(&key, at(10, 0, 0)).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn test_other_keys_do_not_count() {
        let repo = Arc::new(InMemoryUsageRepository::new());
        let limiter = RateLimiter::new(repo.clone());
        let key = key_with_ceiling(1);
        let other = key_with_ceiling(1);

        log_at(&repo, &other, at(10, 1, 0)).await;

        let decision = limiter.check(&key, at(10, 2, 0)).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn test_uses_stored_ceiling() {
        let repo = Arc::new(InMemoryUsageRepository::new());
        let limiter = RateLimiter::new(repo.clone());
        let key = key_with_ceiling(5000);

        for second in 0..1000 {
            log_at(&repo, &key, at(10, 0, 0) + Duration::milliseconds(second)).await;
        }

        let decision = limiter.check(&key, at(10, 30, 0)).await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.limit, 5000);
        assert_eq!(decision.remaining, 3999);
    }
}
