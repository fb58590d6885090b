//! PostgreSQL plumbing shared by the key store and usage ledger

pub mod migrations;
mod postgres;

pub use migrations::{Migration, PostgresMigrator, gateway_migrations, run_migrations};
pub use postgres::{PostgresConfig, connect};
