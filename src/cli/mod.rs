//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use riskbook_core::{PositionSide, Side, Timeframe};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "riskbook")]
#[command(author, version, about = "Position and risk management engine")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", env = "RISKBOOK_CONFIG")]
    pub config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay a price path through the engine and print the risk report
    Simulate(SimulateArgs),
    /// Run pre-trade validation on an order proposal
    ValidateOrder(ValidateOrderArgs),
    /// Validate configuration
    ValidateConfig,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SideArg {
    Long,
    Short,
}

impl SideArg {
    pub fn position_side(self) -> PositionSide {
        match self {
            SideArg::Long => PositionSide::Long,
            SideArg::Short => PositionSide::Short,
        }
    }

    pub fn order_side(self) -> Side {
        match self {
            SideArg::Long => Side::Buy,
            SideArg::Short => Side::Sell,
        }
    }
}

#[derive(clap::Args)]
pub struct SimulateArgs {
    /// Tick file (CSV: timestamp,symbol,price[,bid,ask,volume])
    #[arg(long)]
    pub data: Option<PathBuf>,

    /// Symbol to open a position in
    #[arg(short = 'S', long, default_value = "BTCUSDT")]
    pub symbol: String,

    /// Position side
    #[arg(long, default_value = "long")]
    pub side: SideArg,

    /// Position quantity
    #[arg(short, long, default_value = "1")]
    pub quantity: Decimal,

    /// Entry price; defaults to the first tick of the symbol
    #[arg(long)]
    pub entry: Option<Decimal>,

    /// Stop-loss distance from entry in percent
    #[arg(long, default_value = "2")]
    pub stop_loss_pct: Decimal,

    /// Take-profit distance from entry in percent
    #[arg(long)]
    pub take_profit_pct: Option<Decimal>,

    /// Timeframe selecting the trigger settings
    #[arg(short, long, default_value = "1h")]
    pub timeframe: Timeframe,

    /// Number of generated ticks when no data file is given
    #[arg(long, default_value = "500")]
    pub ticks: usize,

    /// Liquidate whatever is still open at the end of the replay
    #[arg(long)]
    pub emergency_close: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text")]
    pub output: String,

    /// Save the report as JSON
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct ValidateOrderArgs {
    #[arg(short = 'S', long)]
    pub symbol: String,

    #[arg(long, default_value = "long")]
    pub side: SideArg,

    #[arg(short, long)]
    pub quantity: Decimal,

    /// Limit price
    #[arg(short, long)]
    pub price: Decimal,

    #[arg(long)]
    pub stop_loss: Option<Decimal>,

    #[arg(long)]
    pub take_profit: Option<Decimal>,

    /// Account balance
    #[arg(long, default_value = "100000")]
    pub balance: Decimal,
}
