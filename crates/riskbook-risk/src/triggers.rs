//! Per-tick trigger evaluation.
//!
//! On every price tick an open position runs through five steps in a fixed
//! order: stop-loss, take-profit, trailing-stop adjustment, breakeven
//! activation and the partial-close ladder. A stop-loss or take-profit close
//! ends evaluation for that tick.

use riskbook_core::{
    CloseIntent, CloseReason, IntentAction, PositionId, PositionSide, PriceTick, RegistryError,
    Timeframe,
};
use riskbook_registry::{PartialCloseOutcome, PositionMut};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

const BREAKEVEN_MARKER: &str = "breakeven";

/// One rung of the partial-close ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderRung {
    /// Profit percentage at which the rung fires
    pub level_pct: Decimal,
    /// Fraction of the remaining quantity to close
    pub fraction: Decimal,
}

impl LadderRung {
    pub fn new(level_pct: Decimal, fraction: Decimal) -> Self {
        Self { level_pct, fraction }
    }

    /// Marker recorded on the position once this rung has fired.
    pub fn key(&self) -> String {
        format!("ladder_{}", self.level_pct.normalize())
    }
}

fn default_band() -> Decimal {
    dec!(1.0)
}

fn default_enabled() -> bool {
    true
}

/// Trailing, breakeven and ladder settings for one timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Profit percentage that activates the trailing stop
    pub activation_pct: Decimal,
    /// Trailing distance as a percentage of the current price
    pub trailing_distance_pct: Decimal,
    /// Profit percentage that moves the stop to entry
    pub breakeven_pct: Decimal,
    /// Rungs in strictly increasing profit order
    #[serde(default)]
    pub ladder: Vec<LadderRung>,
    /// Width of each rung's band in percentage points
    #[serde(default = "default_band")]
    pub ladder_band_pct: Decimal,
}

impl TriggerConfig {
    /// Settings for hourly strategies.
    pub fn hourly() -> Self {
        Self {
            enabled: true,
            activation_pct: dec!(1.8),
            trailing_distance_pct: dec!(1.2),
            breakeven_pct: dec!(2.5),
            ladder: vec![
                LadderRung::new(dec!(3.0), dec!(0.3)),
                LadderRung::new(dec!(5.0), dec!(0.4)),
                LadderRung::new(dec!(8.0), dec!(0.3)),
            ],
            ladder_band_pct: default_band(),
        }
    }

    /// Settings for 15-minute strategies.
    pub fn fifteen_minute() -> Self {
        Self {
            enabled: true,
            activation_pct: dec!(1.5),
            trailing_distance_pct: dec!(0.8),
            breakeven_pct: dec!(2.0),
            ladder: vec![
                LadderRung::new(dec!(2.5), dec!(0.4)),
                LadderRung::new(dec!(4.0), dec!(0.4)),
                LadderRung::new(dec!(6.0), dec!(0.2)),
            ],
            ladder_band_pct: default_band(),
        }
    }

    /// Replace the ladder.
    pub fn with_ladder(mut self, ladder: Vec<LadderRung>) -> Self {
        self.ladder = ladder;
        self
    }

    /// Check thresholds and ladder shape.
    pub fn validate(&self) -> Result<(), String> {
        if self.activation_pct <= Decimal::ZERO {
            return Err(format!("activation_pct must be positive, got {}", self.activation_pct));
        }
        if self.trailing_distance_pct <= Decimal::ZERO || self.trailing_distance_pct >= dec!(100) {
            return Err(format!(
                "trailing_distance_pct must be in (0, 100), got {}",
                self.trailing_distance_pct
            ));
        }
        if self.breakeven_pct <= Decimal::ZERO {
            return Err(format!("breakeven_pct must be positive, got {}", self.breakeven_pct));
        }
        if self.ladder_band_pct <= Decimal::ZERO {
            return Err(format!("ladder_band_pct must be positive, got {}", self.ladder_band_pct));
        }
        for rung in &self.ladder {
            if rung.fraction <= Decimal::ZERO || rung.fraction > Decimal::ONE {
                return Err(format!(
                    "ladder fraction at {}% must be in (0, 1], got {}",
                    rung.level_pct, rung.fraction
                ));
            }
        }
        for pair in self.ladder.windows(2) {
            if pair[1].level_pct <= pair[0].level_pct {
                return Err(format!(
                    "ladder levels must strictly increase: {} then {}",
                    pair[0].level_pct, pair[1].level_pct
                ));
            }
        }
        Ok(())
    }
}

/// Trigger settings keyed by timeframe, with `1h` as the fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerBook {
    configs: BTreeMap<String, TriggerConfig>,
    fallback: TriggerConfig,
}

impl Default for TriggerBook {
    fn default() -> Self {
        let mut configs = BTreeMap::new();
        configs.insert(Timeframe::Hour1.key().to_string(), TriggerConfig::hourly());
        configs.insert(Timeframe::Minute15.key().to_string(), TriggerConfig::fifteen_minute());
        Self::from_map(configs)
    }
}

impl TriggerBook {
    /// Build from a map keyed by timeframe key (`"1h"`, `"15m"`, ...).
    pub fn from_map(configs: BTreeMap<String, TriggerConfig>) -> Self {
        let fallback = configs
            .get(Timeframe::Hour1.key())
            .cloned()
            .unwrap_or_else(TriggerConfig::hourly);
        Self { configs, fallback }
    }

    /// Settings for `timeframe`, or the hourly settings if it has none.
    pub fn for_timeframe(&self, timeframe: Timeframe) -> &TriggerConfig {
        self.configs.get(timeframe.key()).unwrap_or(&self.fallback)
    }

    /// Validate every configured timeframe.
    pub fn validate(&self) -> Result<(), String> {
        for (key, config) in &self.configs {
            key.parse::<Timeframe>()?;
            config
                .validate()
                .map_err(|e| format!("triggers.{}: {}", key, e))?;
        }
        Ok(())
    }
}

/// Something that happened to a position during one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    StopLossHit { price: Decimal, realized: Decimal },
    TakeProfitHit { price: Decimal, realized: Decimal },
    TrailingStopMoved { from: Option<Decimal>, to: Decimal },
    BreakevenActivated { stop: Decimal },
    PartialClosed { rung: String, quantity: Decimal, realized: Decimal },
    /// A ladder rung would have left nothing open
    LadderClosedFully { rung: String, quantity: Decimal, realized: Decimal },
}

/// Result of evaluating one position against one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerOutcome {
    pub position_id: PositionId,
    pub events: Vec<TriggerEvent>,
    /// Executions the gateway must carry out
    pub intents: Vec<CloseIntent>,
    pub closed: bool,
}

impl TriggerOutcome {
    fn new(position_id: PositionId) -> Self {
        Self {
            position_id,
            events: Vec::new(),
            intents: Vec::new(),
            closed: false,
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.events.is_empty()
    }
}

/// Runs the ordered trigger steps inside a registry mutation.
#[derive(Debug, Clone, Default)]
pub struct TriggerEvaluator {
    book: TriggerBook,
}

impl TriggerEvaluator {
    pub fn new(book: TriggerBook) -> Self {
        Self { book }
    }

    pub fn book(&self) -> &TriggerBook {
        &self.book
    }

    /// Reprice `position` to `tick` and run the trigger steps.
    ///
    /// Must be called from within `PositionRegistry::mutate` so all steps
    /// apply to the same locked position.
    pub fn evaluate(
        &self,
        position: &mut PositionMut<'_>,
        tick: &PriceTick,
    ) -> Result<TriggerOutcome, RegistryError> {
        let price = tick.price;
        let at = tick.timestamp;
        let mut outcome = TriggerOutcome::new(position.id.clone());

        position.update_price(price, at)?;
        if position.close_pending {
            debug!(position = %position.id, price = %price, "Close in flight, triggers skipped");
            return Ok(outcome);
        }

        // 1. Stop-loss
        if let Some(stop) = position.stop_loss {
            if stop_crossed(position.side, price, stop) {
                let quantity = position.quantity;
                let realized = position.close(CloseReason::StopLoss, at)?;
                info!(position = %position.id, price = %price, stop = %stop, realized = %realized, "Stop-loss hit");
                outcome.events.push(TriggerEvent::StopLossHit { price, realized });
                outcome.intents.push(CloseIntent::new(
                    position.id.clone(),
                    IntentAction::Close,
                    quantity,
                    price,
                    CloseReason::StopLoss,
                ));
                outcome.closed = true;
                return Ok(outcome);
            }
        }

        // 2. Take-profit
        if let Some(target) = position.take_profit {
            if target_reached(position.side, price, target) {
                let quantity = position.quantity;
                let realized = position.close(CloseReason::TakeProfit, at)?;
                info!(position = %position.id, price = %price, target = %target, realized = %realized, "Take-profit hit");
                outcome.events.push(TriggerEvent::TakeProfitHit { price, realized });
                outcome.intents.push(CloseIntent::new(
                    position.id.clone(),
                    IntentAction::Close,
                    quantity,
                    price,
                    CloseReason::TakeProfit,
                ));
                outcome.closed = true;
                return Ok(outcome);
            }
        }

        let config = self.book.for_timeframe(position.timeframe);
        if !config.enabled {
            return Ok(outcome);
        }
        let pnl_pct = position.pnl_percent();

        // 3. Trailing stop
        if pnl_pct >= config.activation_pct {
            let offset = price * config.trailing_distance_pct / dec!(100);
            let candidate = match position.side {
                PositionSide::Long => price - offset,
                PositionSide::Short => price + offset,
            };
            let current = position.stop_loss;
            if current.map_or(true, |stop| position.side.is_tighter_stop(candidate, stop)) {
                position.set_stop_loss(candidate);
                debug!(position = %position.id, from = ?current, to = %candidate, pnl_pct = %pnl_pct, "Trailing stop moved");
                outcome.events.push(TriggerEvent::TrailingStopMoved {
                    from: current,
                    to: candidate,
                });
            }
        }

        // 4. Breakeven
        if pnl_pct >= config.breakeven_pct && !position.has_fired(BREAKEVEN_MARKER) {
            let entry = position.entry_price;
            let below_entry = position
                .stop_loss
                .map_or(true, |stop| position.side.is_tighter_stop(entry, stop));
            if below_entry {
                position.set_stop_loss(entry);
                position.mark_fired(BREAKEVEN_MARKER);
                debug!(position = %position.id, stop = %entry, "Breakeven activated");
                outcome.events.push(TriggerEvent::BreakevenActivated { stop: entry });
            }
        }

        // 5. Partial-close ladder
        let rung = config
            .ladder
            .iter()
            .find(|rung| pnl_pct >= rung.level_pct && pnl_pct < rung.level_pct + config.ladder_band_pct);
        if let Some(rung) = rung {
            let key = rung.key();
            match position.partial_close(rung.fraction, &key, at)? {
                PartialCloseOutcome::AlreadyApplied => {}
                PartialCloseOutcome::Applied { quantity, realized } => {
                    info!(position = %position.id, rung = %key, quantity = %quantity, realized = %realized, "Partial close");
                    outcome.intents.push(CloseIntent::new(
                        position.id.clone(),
                        IntentAction::PartialClose,
                        quantity,
                        price,
                        CloseReason::PartialClose { rung: key.clone() },
                    ));
                    outcome.events.push(TriggerEvent::PartialClosed {
                        rung: key,
                        quantity,
                        realized,
                    });
                }
                PartialCloseOutcome::ClosedFully { quantity, realized } => {
                    info!(position = %position.id, rung = %key, quantity = %quantity, realized = %realized, "Ladder closed position");
                    outcome.intents.push(CloseIntent::new(
                        position.id.clone(),
                        IntentAction::Close,
                        quantity,
                        price,
                        CloseReason::FullClose,
                    ));
                    outcome.events.push(TriggerEvent::LadderClosedFully {
                        rung: key,
                        quantity,
                        realized,
                    });
                    outcome.closed = true;
                }
            }
        }

        Ok(outcome)
    }
}

/// Price moved through the stop in the adverse direction.
fn stop_crossed(side: PositionSide, price: Decimal, stop: Decimal) -> bool {
    match side {
        PositionSide::Long => price <= stop,
        PositionSide::Short => price >= stop,
    }
}

/// Price moved through the target in the favorable direction.
fn target_reached(side: PositionSide, price: Decimal, target: Decimal) -> bool {
    match side {
        PositionSide::Long => price >= target,
        PositionSide::Short => price <= target,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use riskbook_core::{OpenPosition, PositionStatus};
    use riskbook_registry::PositionRegistry;

    fn tick(price: Decimal) -> PriceTick {
        PriceTick::new("BTCUSDT", price, Utc::now())
    }

    fn evaluate(
        registry: &PositionRegistry,
        evaluator: &TriggerEvaluator,
        id: &PositionId,
        price: Decimal,
    ) -> TriggerOutcome {
        registry
            .mutate(id, |p| evaluator.evaluate(p, &tick(price)))
            .unwrap()
            .unwrap()
    }

    fn btc_long(registry: &PositionRegistry) -> PositionId {
        registry
            .open(
                OpenPosition::long("BTCUSDT", dec!(1), dec!(50000))
                    .with_stop_loss(dec!(49000))
                    .with_take_profit(dec!(52000)),
            )
            .unwrap()
    }

    #[test]
    fn test_stop_loss_closes_and_short_circuits() {
        let registry = PositionRegistry::new();
        let evaluator = TriggerEvaluator::default();
        let id = btc_long(&registry);

        let outcome = evaluate(&registry, &evaluator, &id, dec!(49000));
        assert!(outcome.closed);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.intents[0].reason, CloseReason::StopLoss);
        assert_eq!(outcome.intents[0].quantity, dec!(1));

        let closed = registry.get(&id).unwrap();
        assert_eq!(closed.status, PositionStatus::Closed);
        assert_eq!(closed.realized_pnl, dec!(-1000));
    }

    #[test]
    fn test_take_profit_closes() {
        let registry = PositionRegistry::new();
        let evaluator = TriggerEvaluator::default();
        let id = btc_long(&registry);

        let outcome = evaluate(&registry, &evaluator, &id, dec!(52100));
        assert!(outcome.closed);
        assert!(matches!(outcome.events[0], TriggerEvent::TakeProfitHit { .. }));
        assert_eq!(registry.get(&id).unwrap().realized_pnl, dec!(2100));
    }

    #[test]
    fn test_claimed_position_only_reprices() {
        let registry = PositionRegistry::new();
        let evaluator = TriggerEvaluator::default();
        let id = btc_long(&registry);
        registry.mutate(&id, |p| p.claim_close()).unwrap().unwrap();

        let outcome = evaluate(&registry, &evaluator, &id, dec!(52100));
        assert!(outcome.is_quiet());
        assert!(!outcome.closed);

        let position = registry.get(&id).unwrap();
        assert!(position.is_open());
        assert_eq!(position.current_price, dec!(52100));
        assert_eq!(position.realized_pnl, Decimal::ZERO);
    }

    #[test]
    fn test_trailing_stop_activates_and_never_loosens() {
        let registry = PositionRegistry::new();
        let evaluator = TriggerEvaluator::default();
        let id = registry
            .open(OpenPosition::long("BTCUSDT", dec!(1), dec!(50000)).with_stop_loss(dec!(49000)))
            .unwrap();

        evaluate(&registry, &evaluator, &id, dec!(50950));
        let stop = registry.get(&id).unwrap().stop_loss.unwrap();
        assert_eq!(stop, dec!(50338.6));

        // Still above activation but lower: candidate is worse, stop holds.
        evaluate(&registry, &evaluator, &id, dec!(50920));
        assert_eq!(registry.get(&id).unwrap().stop_loss, Some(dec!(50338.6)));

        evaluate(&registry, &evaluator, &id, dec!(51000));
        assert_eq!(registry.get(&id).unwrap().stop_loss, Some(dec!(50388.0)));
    }

    #[test]
    fn test_short_trailing_stop_moves_down() {
        let registry = PositionRegistry::new();
        let evaluator = TriggerEvaluator::default();
        let id = registry
            .open(OpenPosition::short("ETHUSDT", dec!(10), dec!(3000)).with_stop_loss(dec!(3100)))
            .unwrap();

        let outcome = registry
            .mutate(&id, |p| {
                evaluator.evaluate(p, &PriceTick::new("ETHUSDT", dec!(2940), Utc::now()))
            })
            .unwrap()
            .unwrap();
        assert!(!outcome.closed);
        // 2940 + 1.2% = 2975.28
        assert_eq!(registry.get(&id).unwrap().stop_loss, Some(dec!(2975.28)));
    }

    #[test]
    fn test_breakeven_without_stop() {
        let registry = PositionRegistry::new();
        let mut config = TriggerConfig::hourly().with_ladder(Vec::new());
        config.activation_pct = dec!(50);
        let mut configs = BTreeMap::new();
        configs.insert("1h".to_string(), config);
        let evaluator = TriggerEvaluator::new(TriggerBook::from_map(configs));

        let id = registry
            .open(OpenPosition::long("BTCUSDT", dec!(1), dec!(50000)))
            .unwrap();
        let outcome = evaluate(&registry, &evaluator, &id, dec!(51300));
        assert_eq!(outcome.events, vec![TriggerEvent::BreakevenActivated { stop: dec!(50000) }]);

        // Once only.
        registry
            .mutate(&id, |p| p.set_stop_loss(dec!(40000)))
            .unwrap();
        let outcome = evaluate(&registry, &evaluator, &id, dec!(51300));
        assert!(outcome.is_quiet());
    }

    #[test]
    fn test_ladder_rung_fires_at_most_once() {
        let registry = PositionRegistry::new();
        let config = TriggerConfig::hourly().with_ladder(vec![
            LadderRung::new(dec!(3), dec!(0.3)),
            LadderRung::new(dec!(5), dec!(0.4)),
        ]);
        let mut configs = BTreeMap::new();
        configs.insert("1h".to_string(), config);
        let evaluator = TriggerEvaluator::new(TriggerBook::from_map(configs));

        let id = registry
            .open(OpenPosition::long("BTCUSDT", dec!(1), dec!(50000)))
            .unwrap();

        let outcome = evaluate(&registry, &evaluator, &id, dec!(51500));
        assert_eq!(outcome.intents.len(), 1);
        assert_eq!(outcome.intents[0].action, IntentAction::PartialClose);
        assert_eq!(outcome.intents[0].quantity, dec!(0.3));
        assert_eq!(registry.get(&id).unwrap().quantity, dec!(0.7));

        for price in [dec!(51200), dec!(51600), dec!(51000), dec!(51550)] {
            let outcome = evaluate(&registry, &evaluator, &id, price);
            assert!(outcome.intents.is_empty(), "rung re-fired at {}", price);
        }
        assert_eq!(registry.get(&id).unwrap().quantity, dec!(0.7));
    }

    #[test]
    fn test_timeframe_fallback() {
        let book = TriggerBook::default();
        assert_eq!(book.for_timeframe(Timeframe::Minute15).activation_pct, dec!(1.5));
        assert_eq!(book.for_timeframe(Timeframe::Hour4), &TriggerConfig::hourly());
        assert!(book.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let bad = TriggerConfig::hourly().with_ladder(vec![
            LadderRung::new(dec!(5), dec!(0.3)),
            LadderRung::new(dec!(3), dec!(0.3)),
        ]);
        assert!(bad.validate().is_err());

        let bad = TriggerConfig::hourly().with_ladder(vec![LadderRung::new(dec!(3), dec!(1.5))]);
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_rung_key() {
        assert_eq!(LadderRung::new(dec!(3.0), dec!(0.3)).key(), "ladder_3");
        assert_eq!(LadderRung::new(dec!(2.5), dec!(0.4)).key(), "ladder_2.5");
    }
}
