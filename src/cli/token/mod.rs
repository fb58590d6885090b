//! Token command - mints an admin JWT with the configured secret

use clap::Args;

use crate::domain::TenantId;
use crate::infrastructure::auth::AdminTokenService;

#[derive(Debug, Args)]
pub struct TokenArgs {
    /// Actor recorded as `created_by` / `revoked_by`
    #[arg(long)]
    pub actor: String,

    /// Tenant the token administers
    #[arg(long)]
    pub tenant: String,
}

pub async fn run(args: TokenArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;

    let tenant = TenantId::new(args.tenant)?;
    let tokens = AdminTokenService::new(&config.admin.jwt_secret, config.admin.token_ttl_hours)?;
    let token = tokens.issue(&args.actor, &tenant)?;

    println!("{}", token);

    Ok(())
}
