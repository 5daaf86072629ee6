//! Configuration management.

mod settings;

pub use settings::{
    AppConfig, AppSettings, ConfigError, EngineSettings, GatewaySettings, LoggingConfig,
};

use config::{Config, Environment, File};
use std::path::Path;

/// Load configuration from a TOML file overlaid with `RISKBOOK__*` environment
/// variables, then validate it.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(
            Environment::with_prefix("RISKBOOK")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let app: AppConfig = config.try_deserialize()?;
    app.validate()?;
    Ok(app)
}
