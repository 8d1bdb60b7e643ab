//! Metric observation overdue: a tracked metric has not been logged within
//! its cadence plus grace.

use crate::{Rule, RuleResult, signals_for};
use serde::Serialize;
use stride_core::error::RuleError;
use stride_core::{
    ActionKind, MetricDefinition, RecommendationCandidate, RecommendationContext,
    RecommendationType, Severity, SignalEntry, StateSnapshot, TargetKind,
};

pub const RULE_ID: &str = "metric_observation_overdue";

/// Overdue-metric count at which severity is at least medium.
const MANY_OVERDUE: usize = 3;

pub struct MetricOverdueRule;

#[derive(Debug, Serialize)]
struct Overdue<'a> {
    id: &'a str,
    name: &'a str,
    days_since: i64,
    allowed_days: i64,
    linked_to_priority_goal: bool,
}

fn days_since(metric: &MetricDefinition, state: &StateSnapshot) -> i64 {
    let reference = metric.last_manual_observation.unwrap_or(metric.created_at);
    (state.as_of - reference).num_days()
}

fn score_for(severity: Severity) -> f64 {
    match severity {
        Severity::High | Severity::Critical => 0.75,
        Severity::Medium => 0.6,
        Severity::Low => 0.5,
    }
}

impl Rule for MetricOverdueRule {
    fn id(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Ask for an observation when a metric is past its cadence plus grace period"
    }

    fn evaluate(
        &self,
        state: &StateSnapshot,
        signals: &[SignalEntry],
    ) -> Result<RuleResult, RuleError> {
        let mut overdue: Vec<Overdue<'_>> = state
            .metrics
            .iter()
            .filter(|m| m.status.is_open())
            .filter_map(|m| {
                let days = days_since(m, state);
                let allowed = m.cadence.days() + m.cadence.grace_days();
                (days > allowed).then(|| Overdue {
                    id: &m.id,
                    name: &m.name,
                    days_since: days,
                    allowed_days: allowed,
                    linked_to_priority_goal: state.links_high_priority_goal(&m.goal_ids),
                })
            })
            .collect();

        if overdue.is_empty() {
            return Ok(RuleResult::not_triggered(RULE_ID)
                .with_evidence("metrics_checked", state.metrics.len()));
        }

        // Goal-linked first, then furthest past its allowance.
        overdue.sort_by(|a, b| {
            b.linked_to_priority_goal
                .cmp(&a.linked_to_priority_goal)
                .then_with(|| (b.days_since - b.allowed_days).cmp(&(a.days_since - a.allowed_days)))
                .then_with(|| a.id.cmp(b.id))
        });

        let severity = if overdue.iter().any(|o| o.linked_to_priority_goal) {
            Severity::High
        } else if overdue.len() >= MANY_OVERDUE {
            Severity::Medium
        } else {
            Severity::Low
        };

        let top = &overdue[0];
        let rationale = if overdue.len() > 1 {
            format!(
                "\"{}\" was last observed {} days ago, and {} other metrics are also overdue.",
                top.name,
                top.days_since,
                overdue.len() - 1
            )
        } else {
            format!("\"{}\" was last observed {} days ago.", top.name, top.days_since)
        };

        let candidate = RecommendationCandidate::new(
            ActionKind::LogObservation,
            TargetKind::Metric,
            format!("Log a value for \"{}\"", top.name),
        )
        .with_type(RecommendationType::Nudge)
        .with_context(RecommendationContext::MetricTracking)
        .with_target(top.id, top.name)
        .with_rationale(rationale)
        .with_score(score_for(severity))
        .with_payload(serde_json::json!({ "metric_id": top.id }))
        .with_summary("Request a metric observation")
        .with_signals(signals_for(signals, TargetKind::Metric, top.id))
        .from_rule(RULE_ID);

        Ok(RuleResult::triggered(RULE_ID, severity)
            .with_evidence("metrics_checked", state.metrics.len())
            .with_evidence("overdue", serde_json::to_value(&overdue).unwrap_or_default())
            .with_recommendation(candidate))
    }
}
