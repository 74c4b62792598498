use anyhow::Context;
use clap::{Parser, Subcommand};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use textile_booking_api::{config, db, migrator::Migrator};

#[derive(Parser)]
#[command(name = "migration", about = "Apply or roll back the booking schema", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<MigrationCommand>,
}

#[derive(Subcommand)]
enum MigrationCommand {
    /// Apply every pending migration (default)
    Up,
    /// Roll back the most recent migrations
    Down {
        #[arg(long, default_value_t = 1, help = "How many migrations to roll back")]
        steps: u32,
    },
    /// List applied and pending migrations
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    info!("Connecting to database");
    let pool = db::establish_connection_from_app_config(&cfg).await?;

    match cli.command.unwrap_or(MigrationCommand::Up) {
        MigrationCommand::Up => db::run_migrations(&pool).await?,
        MigrationCommand::Down { steps } => {
            Migrator::down(&pool, Some(steps))
                .await
                .context("rollback failed")?;
            info!(steps, "Rollback completed");
        }
        MigrationCommand::Status => {
            Migrator::status(&pool).await.context("status failed")?;
        }
    }

    Ok(())
}
