use clap::Parser;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use time_ledger::cli::{ops, Cli};
use time_ledger::clock::SystemClock;
use time_ledger::config::LedgerConfig;
use time_ledger::LedgerEngine;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    let mut config = LedgerConfig::load_or_default(&cli.config);
    if let Some(db) = &cli.db {
        config.storage.db_path = db.clone();
    }

    let engine = match LedgerEngine::open(&config, Arc::new(SystemClock)) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            error!(path = %config.storage.db_path, error = %e, "Failed to open ledger");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = ops::dispatch(cli.command, engine, &config, cli.json).await {
        eprintln!("Error: {}", e);
        std::process::exit(2);
    }
}
