//! CLI command implementations.

pub mod simulate;
pub mod validate;
pub mod validate_order;

use anyhow::{Context, Result};
use riskbook_config::{load_config, AppConfig};
use std::path::Path;

/// Load the configuration file, or the defaults when it does not exist.
pub fn config_or_default(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    load_config(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}
