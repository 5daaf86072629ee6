//! Simulate command implementation.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use riskbook_config::AppConfig;
use riskbook_core::{MarketDataSource, OpenPosition, PositionSide};
use riskbook_data::{CsvTickSource, ScriptedSource};
use riskbook_engine::{Engine, EngineRuntime, OverflowPolicy};
use riskbook_gateway::PaperGateway;
use riskbook_portfolio::{PerformanceAnalytics, RiskReport};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::cli::SimulateArgs;

const DEFAULT_ENTRY: Decimal = dec!(50000);

#[derive(Serialize)]
struct SimulationReport {
    ticks: u64,
    risk: RiskReport,
    performance: PerformanceAnalytics,
}

pub async fn run(args: SimulateArgs, config: &AppConfig) -> Result<()> {
    let (source, first_price): (Arc<dyn MarketDataSource>, Option<Decimal>) = match &args.data {
        Some(path) => {
            let source = CsvTickSource::from_path(path)
                .with_context(|| format!("Failed to load ticks from {}", path.display()))?;
            let first = source
                .ticks()
                .iter()
                .find(|t| t.symbol == args.symbol)
                .map(|t| t.price);
            if first.is_none() {
                anyhow::bail!("No ticks for {} in {}", args.symbol, path.display());
            }
            info!(ticks = source.ticks().len(), symbols = ?source.symbols(), "Loaded tick file");
            let source: Arc<dyn MarketDataSource> = Arc::new(source);
            (source, first)
        }
        None => {
            let base = args.entry.unwrap_or(DEFAULT_ENTRY);
            let prices = generate_path(base, args.ticks);
            let step = Duration::seconds(1);
            let start = Utc::now() - step * args.ticks as i32;
            let first = prices.first().copied();
            let source: Arc<dyn MarketDataSource> =
                Arc::new(ScriptedSource::from_prices(&args.symbol, &prices, start, step));
            (source, first)
        }
    };

    let entry = args
        .entry
        .or(first_price)
        .context("No entry price available")?;
    let side = args.side.position_side();
    let mut params = OpenPosition::new(&args.symbol, side, args.quantity, entry)
        .with_stop_loss(offset(entry, side, -args.stop_loss_pct))
        .with_timeframe(args.timeframe);
    if let Some(pct) = args.take_profit_pct {
        params = params.with_take_profit(offset(entry, side, pct));
    }

    let gateway = PaperGateway::new().with_slippage(config.gateway.paper_slippage_pct);
    let engine = Arc::new(Engine::new(config, Arc::new(gateway)));
    let id = engine.open_position(params)?;
    info!(position = %id, entry = %entry, "Simulation position opened");

    let mut runtime = EngineRuntime::start(engine);
    runtime
        .attach_feed(source, &[], OverflowPolicy::Wait)
        .await
        .context("Failed to attach market data feed")?;
    let ticks = runtime.wait_for_feeds().await;
    let engine = runtime.shutdown().await;

    engine.scan().await;
    if args.emergency_close && engine.registry().open_count() > 0 {
        let report = engine.emergency_close_all("simulation_end").await;
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            realized = %report.total_realized_pnl,
            "Closed remaining positions"
        );
    }

    let report = SimulationReport {
        ticks,
        risk: engine.risk_report(None),
        performance: engine.performance_analytics(1),
    };

    match args.output.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => {
            println!("{}", report.risk.summary());
            print_performance(ticks, &report.performance);
        }
    }

    if let Some(save_path) = &args.save {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(save_path, json)
            .with_context(|| format!("Failed to write {}", save_path.display()))?;
        info!("Results saved to {:?}", save_path);
    }

    Ok(())
}

/// `entry` moved by `pct` percent in the position's favor (negative is adverse).
fn offset(entry: Decimal, side: PositionSide, pct: Decimal) -> Decimal {
    let factor = pct / dec!(100);
    match side {
        PositionSide::Long => entry * (Decimal::ONE + factor),
        PositionSide::Short => entry * (Decimal::ONE - factor),
    }
}

/// Deterministic drifting wave around `base`.
fn generate_path(base: Decimal, n: usize) -> Vec<Decimal> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let shift = 0.03 * (t * 0.05).sin() + 0.00004 * t;
            let factor = Decimal::try_from(1.0 + shift).unwrap_or(Decimal::ONE);
            (base * factor).round_dp(2)
        })
        .collect()
}

fn print_performance(ticks: u64, p: &PerformanceAnalytics) {
    println!("PERFORMANCE");
    println!("───────────────────────────────────────────────────────────");
    println!("  Ticks Replayed:      {}", ticks);
    println!("  Closed Positions:    {}", p.total_trades);
    println!("  Win Rate:            {:.2}%", p.win_rate_pct);
    println!("  Total Profit:        ${:.2}", p.total_profit);
    println!("  Largest Win:         ${:.2}", p.largest_win);
    println!("  Largest Loss:        ${:.2}", p.largest_loss);
    match p.profit_factor {
        Some(pf) => println!("  Profit Factor:       {:.2}", pf),
        None => println!("  Profit Factor:       n/a"),
    }
}
