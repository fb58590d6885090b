//! API key authentication pipeline
//!
//! One pass per request: header, scheme, key shape, lookup, lifecycle, hourly rate
//! window, tenant scope. The first failing step ends the request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::domain::api_key::{ApiKey, ApiKeyRepository};
use crate::domain::usage::{RequestMetadata, UsageLogEntry};
use crate::domain::{AuthError, AuthenticationContext, Clock};
use crate::infrastructure::api_key::{ApiKeyGenerator, RateLimiter};
use crate::infrastructure::observability::record_auth_outcome;
use crate::infrastructure::usage::{spawn_best_effort, UsageLogWriter};

const BEARER_SCHEME: &str = "Bearer";

/// Whether a route checks the caller's tenant filter against the key's tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenantScope {
    #[default]
    Unscoped,
    Enforced,
}

/// What the pipeline needs from an inbound request
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    /// Raw `Authorization` header value
    pub authorization: Option<&'a str>,
    /// Every tenant the caller asked to see. Empty when there is no filter.
    pub tenant_filters: &'a [String],
    pub scope: TenantScope,
    pub metadata: &'a RequestMetadata,
}

/// Authenticates API keys and records their usage
#[derive(Debug, Clone)]
pub struct AuthenticationPipeline {
    api_keys: Arc<dyn ApiKeyRepository>,
    rate_limiter: RateLimiter,
    usage_writer: UsageLogWriter,
    generator: ApiKeyGenerator,
    clock: Arc<dyn Clock>,
}

impl AuthenticationPipeline {
    pub fn new(
        api_keys: Arc<dyn ApiKeyRepository>,
        rate_limiter: RateLimiter,
        usage_writer: UsageLogWriter,
        generator: ApiKeyGenerator,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api_keys,
            rate_limiter,
            usage_writer,
            generator,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Authenticate one request
    pub async fn authenticate(
        &self,
        request: &AuthRequest<'_>,
    ) -> Result<AuthenticationContext, AuthError> {
        let started = Instant::now();
        let result = self.run(request, started).await;

        match &result {
            Ok(context) => {
                record_auth_outcome("success");
                debug!(
                    key_id = %context.api_key.id(),
                    tenant_id = %context.tenant_id(),
                    remaining = context.rate_limit.remaining,
                    "API key authenticated"
                );
            }
            Err(AuthError::Internal(message)) => {
                record_auth_outcome("internal");
                error!(error = %message, endpoint = %request.metadata.endpoint, "Authentication failed internally");
            }
            Err(e) => {
                record_auth_outcome(e.outcome());
                debug!(outcome = e.outcome(), endpoint = %request.metadata.endpoint, "Authentication rejected");
            }
        }

        result
    }

    async fn run(
        &self,
        request: &AuthRequest<'_>,
        started: Instant,
    ) -> Result<AuthenticationContext, AuthError> {
        let header = request.authorization.ok_or(AuthError::MissingHeader)?;
        let candidate = parse_bearer(header)?;

        if !self.generator.validate_format(candidate) {
            return Err(AuthError::InvalidFormat);
        }

        let key_hash = self.generator.hash(candidate);
        let api_key = self
            .api_keys
            .find_active_by_hash(&key_hash)
            .await?
            .ok_or(AuthError::InvalidKey)?;

        let now = self.clock.now();
        if let Some(reason) = api_key.inactive_reason(now) {
            return Err(reason.into());
        }

        let decision = self.rate_limiter.check(&api_key, now).await?;
        if !decision.allowed {
            let entry = UsageLogEntry::for_key(
                &api_key,
                request.metadata,
                429,
                started.elapsed(),
                now,
            )
            .with_error(AuthError::RateLimited(decision).to_string());

            self.usage_writer.write(&entry).await?;

            warn!(
                key_id = %api_key.id(),
                tenant_id = %api_key.tenant_id(),
                limit = decision.limit,
                "Rate limit exceeded"
            );
            return Err(AuthError::RateLimited(decision));
        }

        if request.scope == TenantScope::Enforced {
            // A repeated filter passes only if every value names the key's tenant.
            let mismatch = request
                .tenant_filters
                .iter()
                .find(|requested| !api_key.tenant_id().matches(requested));

            if let Some(requested) = mismatch {
                let err = AuthError::TenantMismatch {
                    requested: requested.clone(),
                };
                let entry = UsageLogEntry::for_key(
                    &api_key,
                    request.metadata,
                    403,
                    started.elapsed(),
                    now,
                )
                .with_error(err.to_string());
                self.usage_writer.spawn(entry);

                warn!(
                    key_id = %api_key.id(),
                    tenant_id = %api_key.tenant_id(),
                    requested = %requested,
                    "Tenant scope violation"
                );
                return Err(err);
            }
        }

        self.touch(&api_key, request.metadata.ip_address.clone(), now);

        Ok(AuthenticationContext {
            api_key,
            rate_limit: decision,
        })
    }

    /// Update last-used bookkeeping without holding up the request
    fn touch(&self, api_key: &ApiKey, ip: Option<String>, at: DateTime<Utc>) -> JoinHandle<()> {
        let api_keys = self.api_keys.clone();
        let id = *api_key.id();

        spawn_best_effort("last_used", self.usage_writer.timeout(), async move {
            api_keys.record_usage(&id, ip, at).await
        })
    }

    /// Append the ledger entry for a handled request, after its response exists
    pub fn record_request(
        &self,
        context: &AuthenticationContext,
        metadata: &RequestMetadata,
        status: u16,
        elapsed: Duration,
    ) -> JoinHandle<()> {
        let mut entry =
            UsageLogEntry::for_key(&context.api_key, metadata, status, elapsed, self.clock.now());
        if status >= 400 {
            entry = entry.with_error(format!("Request failed with status {}", status));
        }

        self.usage_writer.spawn(entry)
    }
}

/// Exactly `Bearer <token>`, separated by a single space
fn parse_bearer(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split(' ');

    match (parts.next(), parts.next(), parts.next()) {
        (Some(BEARER_SCHEME), Some(token), None) if !token.is_empty() => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}
