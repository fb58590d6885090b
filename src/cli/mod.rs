//! CLI module for Keygate
//!
//! - `serve`: run the HTTP gateway
//! - `migrate`: apply (or revert) Postgres migrations
//! - `keys`: manage API keys without going through HTTP
//! - `token`: mint an admin bearer token

pub mod keys;
pub mod migrate;
pub mod serve;
pub mod token;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// Keygate - API key authentication and rate limiting gateway
#[derive(Parser)]
#[command(name = "keygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP gateway
    Serve,

    /// Apply pending Postgres migrations
    Migrate(migrate::MigrateArgs),

    /// Manage API keys directly against the configured store
    #[command(subcommand)]
    Keys(keys::KeysCommand),

    /// Mint an admin token for the admin API
    Token(token::TokenArgs),
}

/// Load `.env` and layered configuration, then install logging
pub(crate) fn bootstrap() -> anyhow::Result<AppConfig> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    logging::init_logging(&config.logging);

    Ok(config)
}
