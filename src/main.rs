use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use twse_valuation::api::MopsClient;
use twse_valuation::data_collector::DataCollector;
use twse_valuation::database::DatabaseManager;
use twse_valuation::models::Config;

/// Ingest quarterly reports for the least recently processed company and
/// refresh its capital-return ratio.
#[derive(Parser)]
#[command(name = "twse-valuation")]
struct Cli {
    /// Override DATABASE_PATH from the environment
    #[arg(long)]
    database_path: Option<String>,

    /// Number of companies to process in this invocation
    #[arg(long, default_value_t = 1)]
    cycles: u32,
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

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("❌ Configuration Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(path) = cli.database_path {
        config.database_path = path;
    }

    let database = match DatabaseManager::new(&config.database_path).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            eprintln!("❌ Database Error: {}", e);
            std::process::exit(1);
        }
    };
    info!("💾 Database ready at {}", config.database_path);

    let client = Arc::new(MopsClient::new(&config)?);
    let collector = DataCollector::new(client, database);

    for _ in 0..cli.cycles {
        let summary = collector.run_cycle().await?;
        match summary.company_id {
            Some(company_id) => info!(
                "✅ {}: {} selected, {} ingested, {} empty, {} failed, ratio {}",
                company_id,
                summary.periods_selected,
                summary.reports_ingested,
                summary.reports_empty,
                summary.reports_failed,
                if summary.ratio_written { "updated" } else { "unchanged" }
            ),
            None => break,
        }
    }

    Ok(())
}
