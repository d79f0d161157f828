//! Refreshes the tracked-company universe from the TWSE securities registry.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use twse_valuation::api::MopsClient;
use twse_valuation::company_sync;
use twse_valuation::database::DatabaseManager;
use twse_valuation::models::Config;

#[derive(Parser)]
#[command(name = "sync_companies")]
struct Cli {
    /// Override DATABASE_PATH from the environment
    #[arg(long)]
    database_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("twse_valuation=info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(path) = cli.database_path {
        config.database_path = path;
    }

    let database = DatabaseManager::new(&config.database_path).await?;
    let client = MopsClient::new(&config)?;

    info!("🔄 Syncing company universe from the securities registry...");
    let summary = company_sync::sync_companies(&client, &database).await?;
    println!(
        "Company sync: {} new, {} updated, {} removed, {} unchanged",
        summary.created, summary.updated, summary.removed, summary.unchanged
    );

    Ok(())
}
