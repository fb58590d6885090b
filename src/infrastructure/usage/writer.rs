//! Usage ledger writes off the request path
//!
//! Post-response entries are appended on a detached task bounded by a timeout.
//! Failures are logged and counted, never returned to the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::usage::{UsageLogEntry, UsageRepository};
use crate::domain::DomainError;
use crate::infrastructure::observability::record_usage_log_dropped;

/// Default bound for a background ledger write
pub const DEFAULT_USAGE_LOG_TIMEOUT: Duration = Duration::from_secs(2);

/// Run `work` on a detached task with its own timeout and error boundary
pub fn spawn_best_effort<F>(task: &'static str, timeout: Duration, work: F) -> JoinHandle<()>
where
    F: Future<Output = Result<(), DomainError>> + Send + 'static,
{
    tokio::spawn(async move {
        match tokio::time::timeout(timeout, work).await {
            Ok(Ok(())) => debug!(task, "Background write completed"),
            Ok(Err(e)) => {
                warn!(task, error = %e, "Background write failed, dropping");
                record_usage_log_dropped("error");
            }
            Err(_) => {
                warn!(task, timeout_ms = timeout.as_millis() as u64, "Background write timed out, dropping");
                record_usage_log_dropped("timeout");
            }
        }
    })
}

/// Writer for usage ledger entries
#[derive(Debug, Clone)]
pub struct UsageLogWriter {
    repository: Arc<dyn UsageRepository>,
    timeout: Duration,
}

impl UsageLogWriter {
    pub fn new(repository: Arc<dyn UsageRepository>) -> Self {
        Self {
            repository,
            timeout: DEFAULT_USAGE_LOG_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Append and wait for the store to acknowledge
    pub async fn write(&self, entry: &UsageLogEntry) -> Result<(), DomainError> {
        self.repository.append(entry).await
    }

    /// Append in the background; the caller never sees the outcome
    pub fn spawn(&self, entry: UsageLogEntry) -> JoinHandle<()> {
        let repository = self.repository.clone();
        spawn_best_effort("usage_log", self.timeout, async move {
            repository.append(&entry).await
        })
    }
}
