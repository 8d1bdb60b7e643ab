//! Check-in missing: a check-in window opened and nothing was recorded.
//!
//! Only fires on an explicit window-start signal. Longer streaks produce
//! higher scores so that they are protected more aggressively.

use crate::{Rule, RuleResult};
use stride_core::error::RuleError;
use stride_core::{
    ActionKind, RecommendationCandidate, RecommendationContext, RecommendationType, Severity,
    SignalEntry, StateSnapshot, TargetKind,
};

pub const RULE_ID: &str = "check_in_missing";

pub struct CheckInMissingRule;

/// `min(0.50 + streak * 0.015, 0.90)`
pub fn streak_score(streak: u32) -> f64 {
    (0.50 + f64::from(streak) * 0.015).min(0.90)
}

fn streak_severity(streak: u32) -> Severity {
    match streak {
        s if s >= 30 => Severity::High,
        s if s >= 7 => Severity::Medium,
        _ => Severity::Low,
    }
}

impl Rule for CheckInMissingRule {
    fn id(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Prompt for a check-in when its window opens and none is recorded for today"
    }

    fn evaluate(
        &self,
        state: &StateSnapshot,
        signals: &[SignalEntry],
    ) -> Result<RuleResult, RuleError> {
        let windows: Vec<&SignalEntry> = signals
            .iter()
            .filter(|s| s.signal_type.check_in_kind().is_some())
            .collect();

        if windows.is_empty() {
            return Ok(RuleResult::not_triggered(RULE_ID).with_evidence("reason", "no_window_signal"));
        }

        // First window in batch order whose check-in is still missing.
        let Some(kind) = windows
            .iter()
            .filter_map(|s| s.signal_type.check_in_kind())
            .find(|kind| state.check_in_today(*kind).is_none())
        else {
            return Ok(RuleResult::not_triggered(RULE_ID).with_evidence("reason", "already_recorded"));
        };

        let streak = state.check_in_streak;
        let score = streak_score(streak);
        let severity = streak_severity(streak);
        let signal_ids: Vec<String> = windows
            .iter()
            .filter(|s| s.signal_type.check_in_kind() == Some(kind))
            .map(|s| s.id.clone())
            .collect();

        let rationale = if streak > 0 {
            format!(
                "Your {} check-in window is open and you're on a {streak}-day streak.",
                kind.as_str()
            )
        } else {
            format!("Your {} check-in window is open.", kind.as_str())
        };

        let candidate = RecommendationCandidate::new(
            ActionKind::CheckIn,
            TargetKind::CheckIn,
            format!("Complete your {} check-in", kind.as_str()),
        )
        .with_type(RecommendationType::Nudge)
        .with_context(RecommendationContext::CheckIn)
        .with_rationale(rationale)
        .with_score(score)
        .with_payload(serde_json::json!({ "kind": kind.as_str() }))
        .with_summary(format!("Start the {} check-in", kind.as_str()))
        .with_signals(signal_ids)
        .from_rule(RULE_ID);

        Ok(RuleResult::triggered(RULE_ID, severity)
            .with_evidence("kind", kind.as_str())
            .with_evidence("streak", streak)
            .with_evidence("score", score)
            .with_recommendation(candidate))
    }
}
