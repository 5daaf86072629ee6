//! Configuration structures.

use riskbook_core::Timeframe;
use riskbook_gateway::RetryPolicy;
use riskbook_risk::{AssessorConfig, RiskLimits, TriggerBook, TriggerConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Configuration parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub limits: RiskLimits,
    /// Trigger settings keyed by timeframe (`"1h"`, `"15m"`, ...)
    #[serde(default = "default_triggers")]
    pub triggers: BTreeMap<String, TriggerConfig>,
    #[serde(default)]
    pub assessor: AssessorConfig,
    #[serde(default)]
    pub gateway: GatewaySettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app: AppSettings::default(),
            logging: LoggingConfig::default(),
            engine: EngineSettings::default(),
            limits: RiskLimits::default(),
            triggers: default_triggers(),
            assessor: AssessorConfig::default(),
            gateway: GatewaySettings::default(),
        }
    }
}

fn default_triggers() -> BTreeMap<String, TriggerConfig> {
    let mut triggers = BTreeMap::new();
    triggers.insert(Timeframe::Hour1.key().to_string(), TriggerConfig::hourly());
    triggers.insert(Timeframe::Minute15.key().to_string(), TriggerConfig::fifteen_minute());
    triggers
}

impl AppConfig {
    /// Parse a TOML document without consulting the environment.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate().map_err(ConfigError::Invalid)?;
        self.trigger_book().validate().map_err(ConfigError::Invalid)?;
        self.engine.validate().map_err(ConfigError::Invalid)?;
        self.gateway.validate().map_err(ConfigError::Invalid)?;

        if self.assessor.max_position_size <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "assessor.max_position_size must be positive".to_string(),
            ));
        }
        if self.assessor.reference_notional <= Decimal::ZERO {
            return Err(ConfigError::Invalid(
                "assessor.reference_notional must be positive".to_string(),
            ));
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigError::Invalid(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                other
            ))),
        }
    }

    /// Trigger settings indexed by timeframe.
    pub fn trigger_book(&self) -> TriggerBook {
        TriggerBook::from_map(self.triggers.clone())
    }

    /// Serialize back to TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "riskbook".to_string(),
            environment: "development".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// Directory for daily-rolling log files
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

/// Control loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Interval of the portfolio scan loop
    pub scan_interval_ms: u64,
    /// Bounded queue size of each per-symbol tick worker
    pub tick_channel_capacity: usize,
    /// A symbol without ticks for this long is stale
    pub stale_after_secs: u64,
    /// Liquidate the book when system risk reaches VERY_HIGH
    pub auto_emergency: bool,
    /// Prices retained per symbol for volatility estimates
    pub max_history: usize,
    /// Sentiment inputs for the system risk assessment
    pub vix_index: f64,
    pub fear_greed_index: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            scan_interval_ms: 5_000,
            tick_channel_capacity: 1_024,
            stale_after_secs: 60,
            auto_emergency: true,
            max_history: 500,
            vix_index: 20.0,
            fear_greed_index: 50.0,
        }
    }
}

impl EngineSettings {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    fn validate(&self) -> Result<(), String> {
        if self.scan_interval_ms == 0 {
            return Err("engine.scan_interval_ms must be positive".to_string());
        }
        if self.tick_channel_capacity == 0 {
            return Err("engine.tick_channel_capacity must be positive".to_string());
        }
        if self.stale_after_secs == 0 {
            return Err("engine.stale_after_secs must be positive".to_string());
        }
        if self.max_history < 2 {
            return Err("engine.max_history must be at least 2".to_string());
        }
        Ok(())
    }
}

/// Execution gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Adverse slippage applied by the paper gateway, in percent
    pub paper_slippage_pct: Decimal,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 2_000,
            paper_slippage_pct: Decimal::ZERO,
        }
    }
}

impl GatewaySettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_millis(self.timeout_ms), self.max_attempts).with_backoff(
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }

    fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("gateway.timeout_ms must be positive".to_string());
        }
        if self.max_attempts == 0 {
            return Err("gateway.max_attempts must be at least 1".to_string());
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err("gateway.max_backoff_ms must not be below initial_backoff_ms".to_string());
        }
        if self.paper_slippage_pct < Decimal::ZERO {
            return Err("gateway.paper_slippage_pct must not be negative".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.max_position_size, dec!(2000));
        assert_eq!(config.limits.max_daily_loss, dec!(500));

        let book = config.trigger_book();
        assert_eq!(book.for_timeframe(Timeframe::Hour1).activation_pct, dec!(1.8));
        assert_eq!(book.for_timeframe(Timeframe::Minute15).trailing_distance_pct, dec!(0.8));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [engine]
            scan_interval_ms = 1000

            [limits]
            max_position_size = 5000

            [triggers.1h]
            activation_pct = 2.0
            trailing_distance_pct = 1.0
            breakeven_pct = 3.0
            ladder = [{ level_pct = 3.0, fraction = 0.5 }]
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.scan_interval(), Duration::from_millis(1000));
        assert_eq!(config.engine.stale_after_secs, 60);
        assert_eq!(config.limits.max_position_size, dec!(5000));
        assert_eq!(config.limits.max_open_positions, 10);

        // An explicit trigger table replaces the defaults
        assert_eq!(config.triggers.len(), 1);
        let fallback = config.trigger_book().for_timeframe(Timeframe::Minute15).clone();
        assert_eq!(fallback.activation_pct, dec!(2.0));
        assert_eq!(fallback.ladder_band_pct, dec!(1.0));
    }

    #[test]
    fn test_rejects_bad_ladder() {
        let err = AppConfig::from_toml_str(
            r#"
            [triggers.1h]
            activation_pct = 1.8
            trailing_distance_pct = 1.2
            breakeven_pct = 2.5
            ladder = [{ level_pct = 5.0, fraction = 0.3 }, { level_pct = 3.0, fraction = 0.3 }]
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("strictly increase"));
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(AppConfig::from_toml_str("[engine]\nscan_interval_ms = 0\n").is_err());
        assert!(AppConfig::from_toml_str("[logging]\nlevel = \"info\"\nformat = \"xml\"\n").is_err());
        assert!(AppConfig::from_toml_str("[limits]\nmax_daily_loss = -1\n").is_err());
        assert!(AppConfig::from_toml_str("[triggers.2h]\nactivation_pct = 1\ntrailing_distance_pct = 1\nbreakeven_pct = 1\n").is_err());
    }

    #[test]
    fn test_retry_policy() {
        let policy = GatewaySettings::default().retry_policy();
        assert_eq!(policy.timeout, Duration::from_secs(5));
        assert_eq!(policy.max_attempts, 3);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = AppConfig::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.triggers, AppConfig::default().triggers);
        assert_eq!(config.limits, RiskLimits::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let text = AppConfig::default().to_toml_string().unwrap();
        let parsed = AppConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.triggers, AppConfig::default().triggers);
    }
}
