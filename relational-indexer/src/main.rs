use clap::Parser;
use dotenv::dotenv;
use tracing::{debug, error, info};

use relational_indexer::{logging, Cli, Config, Dependencies, IndexingError};

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();

    let config = match Config::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    logging::init(config.verbosity, config.json_logs);
    debug!(?config, "Configuration resolved");

    if let Err(e) = run(&config).await {
        error!(error = %e, "Indexing failed");
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(config: &Config) -> Result<(), IndexingError> {
    let dependencies = Dependencies::new(config).await?;
    let report = dependencies.supervisor.run().await?;

    info!(
        processed = report.processed,
        total = report.total,
        elapsed_ms = report.elapsed.as_millis() as u64,
        pool_acquires = report.pool_acquires,
        pool_releases = report.pool_releases,
        "Indexed {} of {} documents",
        report.processed,
        report.total
    );
    Ok(())
}
