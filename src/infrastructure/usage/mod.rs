//! Usage ledger implementations

mod in_memory;
mod postgres_repository;
mod writer;

pub use in_memory::InMemoryUsageRepository;
pub use postgres_repository::PostgresUsageRepository;
pub use writer::{DEFAULT_USAGE_LOG_TIMEOUT, UsageLogWriter, spawn_best_effort};
