//! Engine facade.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use riskbook_config::{AppConfig, EngineSettings};
use riskbook_core::{
    CloseIntent, CloseReason, DataError, EngineError, ExecutionGateway, IntentAction,
    MarketConditions, MarketSnapshot, OpenPosition, OrderProposal, PositionId, PriceTick,
    RegistryError,
};
use riskbook_data::PriceCache;
use riskbook_gateway::RetryPolicy;
use riskbook_monitor::RiskAlertMonitor;
use riskbook_portfolio::{
    assess_system_risk, EmergencyController, EmergencyReport, PerformanceAnalytics,
    PortfolioSnapshot, RiskReport, SystemRiskAssessment,
};
use riskbook_registry::{DailyStats, PerformanceMetrics, PositionRegistry};
use riskbook_risk::{
    BookState, OrderValidator, RiskAssessment, RiskAssessor, TriggerEvaluator, TriggerOutcome,
    ValidationResult,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::events::EngineEvent;

const EVENT_CAPACITY: usize = 1024;
const AUTO_EMERGENCY_REASON: &str = "system_risk_very_high";

/// Result of one periodic scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    /// Positions newly flagged stale
    pub stale_flagged: usize,
    pub assessed: usize,
    pub alerts_raised: usize,
    pub system: SystemRiskAssessment,
    pub emergency: Option<EmergencyReport>,
    pub scanned_at: DateTime<Utc>,
}

/// The position and risk engine.
///
/// Owns the registry and every component operating on it. All methods take
/// `&self`; share the engine across tasks with an `Arc`.
pub struct Engine {
    settings: EngineSettings,
    registry: PositionRegistry,
    evaluator: TriggerEvaluator,
    assessor: RiskAssessor,
    validator: OrderValidator,
    gateway: Arc<dyn ExecutionGateway>,
    retry: RetryPolicy,
    emergency: EmergencyController,
    prices: PriceCache,
    alerts: RiskAlertMonitor,
    failed_intents: Mutex<Vec<CloseIntent>>,
    events: broadcast::Sender<EngineEvent>,
}

impl Engine {
    /// Build an engine from validated configuration.
    pub fn new(config: &AppConfig, gateway: Arc<dyn ExecutionGateway>) -> Self {
        let retry = config.gateway.retry_policy();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            settings: config.engine.clone(),
            registry: PositionRegistry::new(),
            evaluator: TriggerEvaluator::new(config.trigger_book()),
            assessor: RiskAssessor::new(config.assessor.clone()),
            validator: OrderValidator::new(config.limits.clone()),
            emergency: EmergencyController::new(gateway.clone(), retry.clone()),
            gateway,
            retry,
            prices: PriceCache::new(config.engine.max_history),
            alerts: RiskAlertMonitor::default(),
            failed_intents: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Engine with default configuration.
    pub fn with_gateway(gateway: Arc<dyn ExecutionGateway>) -> Self {
        Self::new(&AppConfig::default(), gateway)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &PositionRegistry {
        &self.registry
    }

    pub fn prices(&self) -> &PriceCache {
        &self.prices
    }

    pub fn alerts(&self) -> &RiskAlertMonitor {
        &self.alerts
    }

    /// Subscribe to engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: EngineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Register a position after its entry order was filled.
    pub fn open_position(&self, params: OpenPosition) -> Result<PositionId, EngineError> {
        let side = params.side;
        let quantity = params.quantity;
        let entry_price = params.entry_price;
        let id = self.registry.open(params)?;
        self.publish(EngineEvent::PositionOpened {
            position_id: id.clone(),
            side,
            quantity,
            entry_price,
        });
        Ok(id)
    }

    /// Reprice every open position on the tick's symbol and run its triggers.
    ///
    /// Close intents produced by the triggers are executed through the
    /// gateway before this returns. Returns the outcomes that did something.
    pub async fn on_price_update(&self, tick: PriceTick) -> Result<Vec<TriggerOutcome>, EngineError> {
        if !tick.is_valid() {
            return Err(EngineError::Data(DataError::ParseError(format!(
                "invalid tick for {}: price {} bid {} ask {}",
                tick.symbol, tick.price, tick.bid, tick.ask
            ))));
        }
        self.prices.update(&tick);

        let mut outcomes = Vec::new();
        for id in self.registry.open_ids(Some(&tick.symbol)) {
            let result = self
                .registry
                .mutate(&id, |position| self.evaluator.evaluate(position, &tick))
                .and_then(|outcome| outcome);

            let outcome = match result {
                Ok(outcome) => outcome,
                // Closed by another path since the listing
                Err(err) if err.is_not_found() => continue,
                Err(err) => {
                    warn!(position = %id, error = %err, "Trigger evaluation failed");
                    continue;
                }
            };
            if outcome.is_quiet() {
                continue;
            }

            for event in &outcome.events {
                self.publish(EngineEvent::Trigger {
                    position_id: outcome.position_id.clone(),
                    event: event.clone(),
                });
            }
            for intent in &outcome.intents {
                self.dispatch(intent).await;
            }
            if outcome.closed {
                self.alerts.resolve_position(&outcome.position_id);
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Fully close a position on request.
    ///
    /// The close is booked at the last known price, then sent to the gateway.
    pub async fn close_position(&self, id: &PositionId, reason: &str) -> Result<Decimal, EngineError> {
        let reason = CloseReason::Manual(reason.to_string());
        let (quantity, price, realized) = self
            .registry
            .mutate(id, |position| {
                let quantity = position.quantity;
                let price = position.current_price;
                position
                    .close(reason.clone(), Utc::now())
                    .map(|realized| (quantity, price, realized))
            })
            .and_then(|result| result)?;

        let intent = CloseIntent::new(id.clone(), IntentAction::Close, quantity, price, reason);
        self.dispatch(&intent).await;
        self.alerts.resolve_position(id);
        Ok(realized)
    }

    async fn dispatch(&self, intent: &CloseIntent) {
        match self.retry.execute(self.gateway.as_ref(), intent).await {
            Ok(report) => {
                let reconciled = match self.registry.reconcile_fill(intent, &report) {
                    Ok(delta) => delta,
                    Err(err) => {
                        warn!(position = %intent.position_id, error = %err, "Fill could not be reconciled");
                        Decimal::ZERO
                    }
                };
                debug!(
                    position = %intent.position_id,
                    action = ?intent.action,
                    fill = %report.fill_price,
                    reconciled = %reconciled,
                    "Intent executed"
                );
                self.publish(EngineEvent::IntentExecuted {
                    intent: intent.clone(),
                    report,
                    reconciled,
                });
            }
            Err(err) => {
                error!(
                    position = %intent.position_id,
                    reason = %intent.reason,
                    error = %err,
                    "Close intent failed"
                );
                self.failed_intents.lock().push(intent.clone());
                self.publish(EngineEvent::IntentFailed {
                    intent: intent.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    /// Intents the gateway could not execute. The registry already booked them.
    pub fn failed_intents(&self) -> Vec<CloseIntent> {
        self.failed_intents.lock().clone()
    }

    /// Send failed intents to the gateway again. Returns how many still fail.
    pub async fn retry_failed_intents(&self) -> usize {
        let pending = std::mem::take(&mut *self.failed_intents.lock());
        for intent in &pending {
            self.dispatch(intent).await;
        }
        self.failed_intents.lock().len()
    }

    /// Pre-trade check of a proposal against the current book.
    pub fn validate_order(&self, proposal: &OrderProposal, account_balance: Decimal) -> ValidationResult {
        let open_positions = self.registry.list_open(None);
        let book = BookState {
            open_positions: &open_positions,
            daily_realized: self.registry.daily_realized(Utc::now().date_naive()),
        };
        let market_price = self.prices.last_price(&proposal.symbol);
        let result = self.validator.validate(proposal, account_balance, market_price, &book);
        if !result.allowed {
            info!(symbol = %proposal.symbol, reasons = ?result.reasons, "Order rejected");
        }
        result
    }

    pub fn validator(&self) -> &OrderValidator {
        &self.validator
    }

    /// Liquidate every open position.
    pub async fn emergency_close_all(&self, reason: &str) -> EmergencyReport {
        let report = self.emergency.close_all(&self.registry, reason).await;
        for id in &report.closed {
            self.alerts.resolve_position(id);
        }
        self.publish(EngineEvent::Emergency(report.clone()));
        report
    }

    /// Aggregate the open book.
    pub fn snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot::from_positions(&self.registry.list_open(None))
    }

    pub fn daily_stats(&self, date: NaiveDate) -> DailyStats {
        self.registry.daily_stats(date)
    }

    pub fn performance_metrics(&self) -> PerformanceMetrics {
        self.registry.performance_metrics()
    }

    /// Analytics over positions closed in the last `days` days.
    pub fn performance_analytics(&self, days: u32) -> PerformanceAnalytics {
        PerformanceAnalytics::from_closed(&self.registry.list_closed(None, Some(days)), days)
    }

    /// Assess one open position against the latest market data.
    pub fn assess_position(&self, id: &PositionId) -> Result<RiskAssessment, EngineError> {
        let position = self.registry.get(id)?;
        if !position.is_open() {
            return Err(RegistryError::NotFound(id.clone()).into());
        }
        let market = self.market_snapshot(&position.symbol, position.current_price);
        Ok(self.assessor.assess(&position, &market))
    }

    fn market_snapshot(&self, symbol: &str, fallback_price: Decimal) -> MarketSnapshot {
        self.prices
            .snapshot(symbol)
            .unwrap_or_else(|| MarketSnapshot::flat(symbol, fallback_price))
    }

    fn assess_open(&self, symbol: Option<&str>) -> Vec<RiskAssessment> {
        self.registry
            .list_open(symbol)
            .iter()
            .map(|p| self.assessor.assess(p, &self.market_snapshot(&p.symbol, p.current_price)))
            .collect()
    }

    /// Market-wide inputs derived from the price cache.
    pub fn market_conditions(&self) -> MarketConditions {
        self.prices
            .market_conditions(self.settings.vix_index, self.settings.fear_greed_index)
    }

    pub fn assess_system_risk(&self) -> SystemRiskAssessment {
        assess_system_risk(&self.market_conditions(), &self.registry.list_open(None))
    }

    /// Risk report for all positions or one symbol.
    pub fn risk_report(&self, symbol: Option<&str>) -> RiskReport {
        RiskReport::build(
            symbol,
            self.assess_open(symbol),
            self.snapshot(),
            Some(self.assess_system_risk()),
        )
    }

    /// Flag positions on symbols that have not ticked within `stale_after`.
    pub fn mark_stale(&self, now: DateTime<Utc>) -> usize {
        let stale_after = chrono::Duration::from_std(self.settings.stale_after())
            .unwrap_or_else(|_| chrono::Duration::seconds(60));
        let mut flagged = 0;
        for symbol in self.prices.stale_symbols(now, stale_after) {
            let count = self.registry.mark_stale(&symbol);
            if count > 0 {
                warn!(symbol = %symbol, positions = count, "Market data stale, keeping last known price");
                self.publish(EngineEvent::PositionsStale { symbol, count });
                flagged += count;
            }
        }
        flagged
    }

    /// Store each assessed level on its position and feed the alert monitor.
    /// Positions closed since they were assessed are skipped. Returns the
    /// number of alerts raised.
    fn apply_assessments(&self, assessments: &[RiskAssessment]) -> usize {
        let mut alerts_raised = 0;
        for assessment in assessments {
            let stored = self
                .registry
                .mutate(&assessment.position_id, |p| p.set_risk_level(assessment.level));
            if let Err(err) = stored {
                debug!(position = %assessment.position_id, error = %err, "Assessed position gone, skipped");
                continue;
            }
            if let Some(alert) = self.alerts.observe(assessment) {
                alerts_raised += 1;
                self.publish(EngineEvent::RiskAlert(alert));
            }
        }
        alerts_raised
    }

    /// One pass of the periodic scan: staleness, position risk, alerts,
    /// system risk and, when enabled, automatic liquidation.
    pub async fn scan(&self) -> ScanReport {
        let now = Utc::now();
        let stale_flagged = self.mark_stale(now);

        let assessments = self.assess_open(None);
        let alerts_raised = self.apply_assessments(&assessments);

        let system = self.assess_system_risk();
        self.publish(EngineEvent::SystemRisk(system.clone()));

        let emergency = if system.requires_emergency()
            && self.settings.auto_emergency
            && self.registry.open_count() > 0
        {
            warn!(score = system.score, factors = ?system.risk_factors, "System risk VERY_HIGH");
            Some(self.emergency_close_all(AUTO_EMERGENCY_REASON).await)
        } else {
            None
        };

        ScanReport {
            stale_flagged,
            assessed: assessments.len(),
            alerts_raised,
            system,
            emergency,
            scanned_at: now,
        }
    }
}
