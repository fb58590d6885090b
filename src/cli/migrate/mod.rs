//! Migrate command - applies the key store and usage ledger schema

use clap::Args;
use tracing::info;

use crate::infrastructure::storage::{gateway_migrations, run_migrations, PostgresMigrator};

#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Revert the most recently applied migration instead
    #[arg(long)]
    pub revert_last: bool,
}

pub async fn run(args: MigrateArgs) -> anyhow::Result<()> {
    let config = super::bootstrap()?;
    let pool = crate::connect_postgres(&config).await?;

    if !args.revert_last {
        let applied = run_migrations(&pool).await?;
        info!("Applied {} migration(s)", applied);
        return Ok(());
    }

    let migrator = PostgresMigrator::new(pool);
    let Some(version) = migrator.current_version().await? else {
        info!("No migrations to revert");
        return Ok(());
    };

    let migration = gateway_migrations()
        .into_iter()
        .find(|m| m.version == version)
        .ok_or_else(|| anyhow::anyhow!("Unknown migration version {}", version))?;

    migrator.revert_migration(&migration).await?;
    info!(version, description = migration.description, "Migration reverted");

    Ok(())
}
