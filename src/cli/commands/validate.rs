//! Validate configuration command.

use anyhow::Result;
use riskbook_config::load_config;
use std::path::Path;

pub async fn run(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    match load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("App: {}", config.app.name);
            println!("Environment: {}", config.app.environment);
            println!("Log level: {}", config.logging.level);
            println!("Scan interval: {} ms", config.engine.scan_interval_ms);
            println!("Max position size: {}", config.limits.max_position_size);
            println!("Max open positions: {}", config.limits.max_open_positions);
            println!("Max daily loss: {}", config.limits.max_daily_loss);
            for (timeframe, triggers) in &config.triggers {
                println!(
                    "Triggers {}: trail at {}% by {}%, breakeven at {}%, {} ladder rungs",
                    timeframe,
                    triggers.activation_pct,
                    triggers.trailing_distance_pct,
                    triggers.breakeven_pct,
                    triggers.ladder.len()
                );
            }
            println!(
                "Gateway: {} attempts, {} ms timeout",
                config.gateway.max_attempts, config.gateway.timeout_ms
            );
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
