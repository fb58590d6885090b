//! Keys command - drives the key lifecycle service without the HTTP layer
//!
//! Results are printed as JSON on stdout in the same shape the admin API returns.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;
use tracing::warn;

use crate::api::admin::api_keys::{ApiKeyResponse, ApiKeyWithSecretResponse, DeleteApiKeyResponse};
use crate::config::{AppConfig, StorageBackend};
use crate::domain::api_key::{ApiKeyFilter, ApiKeyId};
use crate::domain::{SystemClock, TenantId};
use crate::infrastructure::api_key::{ApiKeyService, NewApiKey};

#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    /// Issue a new key; the secret is printed once
    Create(CreateArgs),
    /// List the keys of a tenant
    List(ListArgs),
    /// Revoke a key
    Revoke(RevokeArgs),
    /// Delete a key and its usage history
    Delete(DeleteArgs),
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(long)]
    pub tenant: String,
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
    /// Requests per hour; the configured default when omitted
    #[arg(long)]
    pub rate_limit: Option<u32>,
    /// RFC 3339 timestamp
    #[arg(long)]
    pub expires_at: Option<DateTime<Utc>>,
    #[arg(long, default_value = "cli")]
    pub actor: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    pub tenant: String,
    #[arg(long)]
    pub active: Option<bool>,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long)]
    pub limit: Option<u32>,
}

#[derive(Debug, Args)]
pub struct RevokeArgs {
    #[arg(long)]
    pub tenant: String,
    pub id: ApiKeyId,
    #[arg(long)]
    pub reason: Option<String>,
    #[arg(long, default_value = "cli")]
    pub actor: String,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    #[arg(long)]
    pub tenant: String,
    pub id: ApiKeyId,
}

pub async fn run(command: KeysCommand) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let service = create_service(&config).await?;

    match command {
        KeysCommand::Create(args) => {
            let tenant = TenantId::new(args.tenant)?;
            let created = service
                .create(
                    &tenant,
                    &args.actor,
                    NewApiKey {
                        name: args.name,
                        description: args.description,
                        rate_limit: args.rate_limit,
                        expires_at: args.expires_at,
                    },
                )
                .await?;

            print_json(&ApiKeyWithSecretResponse {
                api_key: ApiKeyResponse::from(&created.api_key),
                key: created.secret,
            })
        }
        KeysCommand::List(args) => {
            let filter = ApiKeyFilter::new(TenantId::new(args.tenant)?)
                .with_active(args.active)
                .with_search(args.search)
                .with_page(args.page, args.limit);
            let page = service.list(&filter).await?;

            let items: Vec<ApiKeyResponse> = page.items.iter().map(ApiKeyResponse::from).collect();
            print_json(&items)
        }
        KeysCommand::Revoke(args) => {
            let tenant = TenantId::new(args.tenant)?;
            let key = service
                .revoke(&tenant, &args.id, &args.actor, args.reason)
                .await?;

            print_json(&ApiKeyResponse::from(&key))
        }
        KeysCommand::Delete(args) => {
            let tenant = TenantId::new(args.tenant)?;
            let deleted = service.delete(&tenant, &args.id).await?;

            print_json(&DeleteApiKeyResponse {
                id: deleted.id,
                usage_entries_removed: deleted.usage_entries_removed,
            })
        }
    }
}

async fn create_service(config: &AppConfig) -> anyhow::Result<ApiKeyService> {
    if config.storage.backend == StorageBackend::Memory {
        warn!("storage.backend is 'memory'; changes are discarded when the command exits");
    }

    let stores = crate::create_stores(config).await?;
    crate::create_api_key_service(config, &stores, Arc::new(SystemClock))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
