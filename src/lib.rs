//! Keygate
//!
//! API key authentication and rate-limiting gateway:
//! - Issues tenant-scoped API keys and stores only their hashes
//! - Authenticates bearer keys and enforces an hourly per-key ceiling
//! - Records every authenticated request in a usage ledger

pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use self::config::AppConfig;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use api::state::AppState;
use self::config::StorageBackend;
use domain::{ApiKeyRepository, Clock, SystemClock, UsageRepository};
use infrastructure::{
    api_key::{
        ApiKeyGenerator, ApiKeyService, InMemoryApiKeyRepository, PostgresApiKeyRepository,
        RateLimiter,
    },
    auth::{AdminTokenService, AuthenticationPipeline},
    storage::{connect, run_migrations, PostgresConfig},
    usage::{InMemoryUsageRepository, PostgresUsageRepository, UsageLogWriter},
};

/// Key store and usage ledger selected by configuration
#[derive(Debug, Clone)]
pub struct Stores {
    pub api_keys: Arc<dyn ApiKeyRepository>,
    pub usage: Arc<dyn UsageRepository>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            api_keys: Arc::new(InMemoryApiKeyRepository::new()),
            usage: Arc::new(InMemoryUsageRepository::new()),
        }
    }
}

/// Open the configured backend, migrating Postgres when enabled
pub async fn create_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    info!("Storage backend: {:?}", config.storage.backend);

    match config.storage.backend {
        StorageBackend::Memory => Ok(Stores::in_memory()),
        StorageBackend::Postgres => {
            let pool = connect_postgres(config).await?;

            if config.storage.run_migrations {
                let applied = run_migrations(&pool).await?;
                info!("Applied {} migration(s)", applied);
            }

            Ok(Stores {
                api_keys: Arc::new(PostgresApiKeyRepository::new(pool.clone())),
                usage: Arc::new(PostgresUsageRepository::new(pool)),
            })
        }
    }
}

/// Connection pool for the configured database
pub async fn connect_postgres(config: &AppConfig) -> anyhow::Result<sqlx::PgPool> {
    let url = config
        .storage
        .database_url()
        .context("storage.database_url or DATABASE_URL is required for the postgres backend")?;

    info!("Connecting to PostgreSQL...");
    let pool = connect(
        &PostgresConfig::new(url).with_max_connections(config.storage.max_connections),
    )
    .await?;
    info!("PostgreSQL connection established");

    Ok(pool)
}

/// Key generator configured with the issuing prefix and optional hash pepper
pub fn create_generator(config: &AppConfig) -> anyhow::Result<ApiKeyGenerator> {
    let generator = ApiKeyGenerator::new(config.auth.key_prefix.as_str())?;

    Ok(match config.auth.hash_secret.as_deref() {
        Some(secret) if !secret.is_empty() => generator.with_hash_secret(secret)?,
        _ => generator,
    })
}

/// Lifecycle service over the given stores
pub fn create_api_key_service(
    config: &AppConfig,
    stores: &Stores,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<ApiKeyService> {
    Ok(ApiKeyService::new(
        stores.api_keys.clone(),
        stores.usage.clone(),
        create_generator(config)?,
        clock,
    )
    .with_default_rate_limit(config.auth.default_rate_limit))
}

/// Wire every service over already-opened stores
pub fn create_app_state_with_stores(
    config: &AppConfig,
    stores: Stores,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<AppState> {
    let api_key_service = create_api_key_service(config, &stores, clock.clone())?;

    let usage_writer = UsageLogWriter::new(stores.usage.clone())
        .with_timeout(Duration::from_millis(config.auth.usage_log_timeout_ms));
    let pipeline = AuthenticationPipeline::new(
        stores.api_keys.clone(),
        RateLimiter::new(stores.usage.clone()),
        usage_writer,
        create_generator(config)?,
        clock,
    );

    let admin_tokens =
        AdminTokenService::new(&config.admin.jwt_secret, config.admin.token_ttl_hours)?;

    Ok(AppState::new(
        Arc::new(api_key_service),
        Arc::new(pipeline),
        Arc::new(admin_tokens),
    )
    .with_rate_limit_headers(config.auth.expose_rate_limit_headers))
}

/// Create the application state with all services initialized
pub async fn create_app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let stores = create_stores(config).await?;
    create_app_state_with_stores(config, stores, Arc::new(SystemClock))
}
