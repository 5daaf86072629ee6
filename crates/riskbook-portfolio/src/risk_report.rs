//! Risk report generation.

use chrono::{DateTime, Utc};
use riskbook_core::RiskLevel;
use riskbook_risk::RiskAssessment;
use serde::{Deserialize, Serialize};

use crate::{PortfolioSnapshot, SystemRiskAssessment};

/// Per-position risk plus book-wide aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskReport {
    /// Symbol filter the report was built with
    pub symbol: Option<String>,
    pub overall_level: RiskLevel,
    pub average_score: f64,
    pub high_risk_positions: usize,
    pub total_positions: usize,
    pub assessments: Vec<RiskAssessment>,
    pub recommendations: Vec<String>,
    pub snapshot: PortfolioSnapshot,
    pub system: Option<SystemRiskAssessment>,
    pub generated_at: DateTime<Utc>,
}

impl RiskReport {
    /// Build a report from position assessments.
    ///
    /// Only assessments for `symbol` are kept when a filter is given. An
    /// empty report has overall level `VERY_LOW`.
    pub fn build(
        symbol: Option<&str>,
        assessments: Vec<RiskAssessment>,
        snapshot: PortfolioSnapshot,
        system: Option<SystemRiskAssessment>,
    ) -> Self {
        let assessments: Vec<RiskAssessment> = assessments
            .into_iter()
            .filter(|a| symbol.map_or(true, |s| a.symbol == s))
            .collect();

        let total_positions = assessments.len();
        let high_risk_positions = assessments.iter().filter(|a| a.level.is_elevated()).count();
        let average_score = if total_positions > 0 {
            assessments.iter().map(|a| a.score).sum::<f64>() / total_positions as f64
        } else {
            0.0
        };

        let mut recommendations = Vec::new();
        if high_risk_positions > 0 {
            recommendations.push(format!(
                "Close or reduce {} high-risk position(s)",
                high_risk_positions
            ));
        }
        if average_score > 0.6 {
            recommendations.push("Reduce overall market exposure".to_string());
        }
        if let Some(system) = &system {
            for action in &system.recommended_actions {
                if !recommendations.contains(action) {
                    recommendations.push(action.clone());
                }
            }
        }

        Self {
            symbol: symbol.map(str::to_string),
            overall_level: RiskLevel::from_aggregate_score(average_score),
            average_score,
            high_risk_positions,
            total_positions,
            assessments,
            recommendations,
            snapshot,
            system,
            generated_at: Utc::now(),
        }
    }

    /// Generate a text summary.
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str("═══════════════════════════════════════════════════════════\n");
        s.push_str("                        RISK REPORT                         \n");
        s.push_str("═══════════════════════════════════════════════════════════\n\n");

        s.push_str("BOOK\n");
        s.push_str("───────────────────────────────────────────────────────────\n");
        s.push_str(&format!("  Open Positions:      {}\n", self.snapshot.open_positions));
        s.push_str(&format!("  Total Exposure:      ${:.2}\n", self.snapshot.total_exposure));
        s.push_str(&format!("  Long / Short:        ${:.2} / ${:.2}\n",
            self.snapshot.long_exposure, self.snapshot.short_exposure));
        s.push_str(&format!("  Unrealized P&L:      ${:.2}\n", self.snapshot.unrealized_pnl));
        s.push_str(&format!("  Concentration:       {:.2}%\n", self.snapshot.concentration * 100.0));
        s.push_str(&format!("  Health:              {:.2}\n", self.snapshot.health));
        s.push('\n');

        s.push_str("RISK\n");
        s.push_str("───────────────────────────────────────────────────────────\n");
        s.push_str(&format!("  Overall Level:       {}\n", self.overall_level));
        s.push_str(&format!("  Average Score:       {:.3}\n", self.average_score));
        s.push_str(&format!(
            "  High Risk:           {}/{}\n",
            self.high_risk_positions, self.total_positions
        ));
        if let Some(system) = &self.system {
            s.push_str(&format!("  System Level:        {}\n", system.level));
            s.push_str(&format!("  Market Volatility:   {:.3}\n", system.market_volatility));
            s.push_str(&format!("  Liquidity:           {}\n", system.liquidity));
        }
        s.push('\n');

        if !self.assessments.is_empty() {
            s.push_str("POSITIONS\n");
            s.push_str("───────────────────────────────────────────────────────────\n");
            for a in &self.assessments {
                s.push_str(&format!(
                    "  {:<24} {:>6.3}  {:<10} {}\n",
                    a.position_id.to_string(),
                    a.score,
                    a.level.to_string(),
                    a.action
                ));
            }
            s.push('\n');
        }

        if !self.recommendations.is_empty() {
            s.push_str("RECOMMENDATIONS\n");
            s.push_str("───────────────────────────────────────────────────────────\n");
            for r in &self.recommendations {
                s.push_str(&format!("  - {}\n", r));
            }
            s.push('\n');
        }

        s.push_str("═══════════════════════════════════════════════════════════\n");

        s
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
