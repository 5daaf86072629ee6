//! Position and risk engine CLI application.

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::commands::config_or_default;
use cli::{Cli, Commands};
use riskbook_monitor::setup_logging;
use std::path::Path;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::ValidateConfig = cli.command {
        setup_logging(cli.log_level.as_str(), cli.json_logs, None);
        return cli::commands::validate::run(&cli.config).await;
    }

    let config = config_or_default(&cli.config)?;

    // Setup logging; keep the guard so file output is flushed on exit
    let json = cli.json_logs || config.logging.is_json();
    let _guard = setup_logging(
        cli.log_level.as_str(),
        json,
        config.logging.file.as_deref().map(Path::new),
    );
    if !cli.config.exists() {
        warn!(path = %cli.config.display(), "Configuration file not found, using defaults");
    }

    match cli.command {
        Commands::Simulate(args) => cli::commands::simulate::run(args, &config).await,
        Commands::ValidateOrder(args) => cli::commands::validate_order::run(args, &config).await,
        Commands::ValidateConfig => Ok(()),
    }
}
