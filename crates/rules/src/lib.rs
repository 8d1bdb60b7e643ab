//! Tier 0: deterministic rules over a state snapshot.
//!
//! Each [`Rule`] is a pure function of `(state, signals)`. The
//! [`RuleEngine`] fans them out concurrently, recovers individual failures,
//! and decides whether the batch warrants a Tier 1 assessment.
//!
//! Built-in rules:
//! - `check_in_missing`: a check-in window opened and nothing was recorded
//! - `deadline_proximity`: work due within 48 hours with too little progress
//! - `energy_mismatch`: low reported energy and demanding tasks today
//! - `habit_adherence`: seven-day adherence below 50%
//! - `metric_observation_overdue`: a metric has gone unobserved past its cadence
//! - `recurring_task_staleness`: routine or repeatedly rescheduled tasks

pub mod check_in;
pub mod deadline;
pub mod energy;
pub mod engine;
pub mod escalation;
pub mod habit;
pub mod metric;
pub mod recurring;

#[cfg(test)]
pub(crate) mod fixtures;

pub use engine::{RuleEngine, RuleEvaluationResult};
pub use escalation::EscalationReason;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stride_core::error::RuleError;
use stride_core::{RecommendationCandidate, Severity, SignalEntry, StateSnapshot};

/// A single deterministic check.
///
/// Implementations must not perform I/O or read the clock; `state.as_of` is
/// the only notion of "now".
pub trait Rule: Send + Sync {
    /// Stable identifier, used in configuration and evidence.
    fn id(&self) -> &str;

    /// One-line description for the rule catalog.
    fn description(&self) -> &str;

    fn evaluate(
        &self,
        state: &StateSnapshot,
        signals: &[SignalEntry],
    ) -> Result<RuleResult, RuleError>;
}

/// The outcome of one rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub rule_id: String,
    pub triggered: bool,
    pub severity: Severity,
    /// Diagnostic bag for traceability. Never read by control flow.
    #[serde(default)]
    pub evidence: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_recommendation: Option<RecommendationCandidate>,
    #[serde(default)]
    pub requires_escalation: bool,
}

impl RuleResult {
    pub fn not_triggered(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            triggered: false,
            severity: Severity::Low,
            evidence: serde_json::Map::new(),
            direct_recommendation: None,
            requires_escalation: false,
        }
    }

    pub fn triggered(rule_id: impl Into<String>, severity: Severity) -> Self {
        Self {
            triggered: true,
            severity,
            ..Self::not_triggered(rule_id)
        }
    }

    /// A rule that could not produce a result. Counted as not triggered.
    pub fn failed(rule_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::not_triggered(rule_id).with_evidence("error", error.into())
    }

    pub fn with_evidence(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.evidence.insert(key.to_string(), value.into());
        self
    }

    pub fn with_recommendation(mut self, candidate: RecommendationCandidate) -> Self {
        self.direct_recommendation = Some(candidate);
        self
    }

    pub fn escalating(mut self, requires_escalation: bool) -> Self {
        self.requires_escalation = requires_escalation;
        self
    }

    /// The error text captured for a failed rule, if any.
    pub fn error(&self) -> Option<&str> {
        self.evidence.get("error").and_then(|v| v.as_str())
    }
}

/// All built-in rules, in evaluation order.
pub fn default_rules() -> Vec<Arc<dyn Rule>> {
    vec![
        Arc::new(check_in::CheckInMissingRule),
        Arc::new(deadline::DeadlineProximityRule),
        Arc::new(energy::EnergyMismatchRule),
        Arc::new(habit::HabitAdherenceRule),
        Arc::new(metric::MetricOverdueRule),
        Arc::new(recurring::RecurringStalenessRule),
    ]
}

/// Ids of the signals in the batch that target a given entity.
pub(crate) fn signals_for(
    signals: &[SignalEntry],
    kind: stride_core::TargetKind,
    id: &str,
) -> Vec<String> {
    signals
        .iter()
        .filter(|s| s.targets(kind, id))
        .map(|s| s.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique_and_described() {
        let rules = default_rules();
        let mut ids: Vec<&str> = rules.iter().map(|r| r.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 6);
        assert!(rules.iter().all(|r| !r.description().is_empty()));
    }

    #[test]
    fn failed_result_records_error() {
        let result = RuleResult::failed("x", "boom");
        assert!(!result.triggered);
        assert_eq!(result.error(), Some("boom"));
        assert!(result.direct_recommendation.is_none());
    }
}
