//! Usage ledger domain
//!
//! Append-only per-request outcomes. The ledger is both the audit trail and the
//! counter source for rate limiting.

mod record;
mod repository;

pub use record::{RequestMetadata, UsageLogEntry, UsageLogId, UsageStats};
#[cfg(test)]
pub use repository::MockUsageRepository;
pub use repository::{DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, UsageQuery, UsageRepository};
