//! Risk alert tracking with one active alert per position.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use riskbook_core::{PositionId, RecommendedAction, RiskLevel};
use riskbook_risk::RiskAssessment;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// An alert raised for a high-risk position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub id: u64,
    pub position_id: PositionId,
    pub symbol: String,
    pub level: RiskLevel,
    pub score: f64,
    pub action: RecommendedAction,
    pub message: String,
    pub acknowledged: bool,
    pub raised_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Tracks alerts raised from risk assessments.
///
/// A position has at most one active alert. It is raised when an assessment
/// reaches HIGH or VERY_HIGH, escalated in place, and resolved once the
/// position drops back below HIGH or closes.
pub struct RiskAlertMonitor {
    active: RwLock<HashMap<PositionId, RiskAlert>>,
    resolved: RwLock<VecDeque<RiskAlert>>,
    next_id: AtomicU64,
    max_history: usize,
}

impl Default for RiskAlertMonitor {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl RiskAlertMonitor {
    /// Create a monitor keeping up to `max_history` resolved alerts.
    pub fn new(max_history: usize) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            resolved: RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
            max_history,
        }
    }

    /// Update alerts from a fresh assessment.
    ///
    /// Returns the alert when one was raised or escalated.
    pub fn observe(&self, assessment: &RiskAssessment) -> Option<RiskAlert> {
        let mut active = self.active.write();

        if !assessment.level.is_elevated() {
            if let Some(alert) = active.remove(&assessment.position_id) {
                drop(active);
                debug!(position = %assessment.position_id, "Risk alert cleared");
                self.archive(alert);
            }
            return None;
        }

        if let Some(alert) = active.get_mut(&assessment.position_id) {
            alert.score = assessment.score;
            alert.action = assessment.action;
            if assessment.level <= alert.level {
                alert.level = assessment.level;
                return None;
            }
            alert.level = assessment.level;
            alert.acknowledged = false;
            alert.message = message(assessment);
            warn!(
                position = %assessment.position_id,
                level = %assessment.level,
                score = assessment.score,
                "Risk alert escalated"
            );
            return Some(alert.clone());
        }

        let alert = RiskAlert {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            position_id: assessment.position_id.clone(),
            symbol: assessment.symbol.clone(),
            level: assessment.level,
            score: assessment.score,
            action: assessment.action,
            message: message(assessment),
            acknowledged: false,
            raised_at: assessment.assessed_at,
            resolved_at: None,
        };
        warn!(
            alert = alert.id,
            position = %alert.position_id,
            level = %alert.level,
            score = alert.score,
            action = %alert.action,
            "Risk alert raised"
        );
        active.insert(alert.position_id.clone(), alert.clone());
        Some(alert)
    }

    /// Resolve the alert of a position that closed.
    pub fn resolve_position(&self, position_id: &PositionId) -> bool {
        let removed = self.active.write().remove(position_id);
        match removed {
            Some(alert) => {
                self.archive(alert);
                true
            }
            None => false,
        }
    }

    /// Acknowledge an active alert. Returns false for unknown ids.
    pub fn acknowledge(&self, alert_id: u64) -> bool {
        self.active
            .write()
            .values_mut()
            .find(|a| a.id == alert_id)
            .map(|a| a.acknowledged = true)
            .is_some()
    }

    /// Active alerts, oldest first.
    pub fn active(&self) -> Vec<RiskAlert> {
        let mut alerts: Vec<RiskAlert> = self.active.read().values().cloned().collect();
        alerts.sort_by_key(|a| a.id);
        alerts
    }

    /// Active alerts nobody has acknowledged yet.
    pub fn unacknowledged(&self) -> Vec<RiskAlert> {
        self.active().into_iter().filter(|a| !a.acknowledged).collect()
    }

    /// Most recently resolved alerts, newest first.
    pub fn history(&self, limit: usize) -> Vec<RiskAlert> {
        self.resolved.read().iter().rev().take(limit).cloned().collect()
    }

    fn archive(&self, mut alert: RiskAlert) {
        alert.resolved_at = Some(Utc::now());
        let mut resolved = self.resolved.write();
        resolved.push_back(alert);
        while resolved.len() > self.max_history {
            resolved.pop_front();
        }
    }
}

fn message(assessment: &RiskAssessment) -> String {
    format!(
        "{} risk on {} (score {:.2}), recommended action {}",
        assessment.level, assessment.position_id, assessment.score, assessment.action
    )
}
