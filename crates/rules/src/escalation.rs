//! Tier 0 → Tier 1 escalation decision.
//!
//! Conditions are checked in order and the first match wins:
//! 1. any triggered rule set `requires_escalation`
//! 2. two or more triggered rules at high or critical severity
//! 3. direct recommendations that conflict with each other
//! 4. four or more rules triggered at once

use crate::RuleResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use stride_core::{ActionKind, RecommendationCandidate, TargetKind};

/// Minimum high/critical rules for escalation.
const HIGH_SEVERITY_COUNT: usize = 2;

/// Minimum triggered rules for escalation on volume alone.
const COMPLEXITY_COUNT: usize = 4;

/// Why a batch did or did not escalate past Tier 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum EscalationReason {
    ExplicitFlag { rule_id: String },
    MultipleHighSeverity { count: usize },
    ConflictingRecommendations { detail: String },
    ComplexityThreshold { triggered: usize },
    /// Tier 0 already produced recommendations and nothing warranted more.
    NoEscalationUseful { recommendations: usize },
    NotWarranted,
}

impl EscalationReason {
    pub fn escalates(&self) -> bool {
        !matches!(
            self,
            EscalationReason::NoEscalationUseful { .. } | EscalationReason::NotWarranted
        )
    }
}

impl fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitFlag { rule_id } => write!(f, "rule {rule_id} requested escalation"),
            Self::MultipleHighSeverity { count } => {
                write!(f, "{count} rules triggered at high or critical severity")
            }
            Self::ConflictingRecommendations { detail } => {
                write!(f, "conflicting recommendations: {detail}")
            }
            Self::ComplexityThreshold { triggered } => {
                write!(f, "{triggered} rules triggered")
            }
            Self::NoEscalationUseful { recommendations } => {
                write!(f, "{recommendations} direct recommendations; no escalation needed")
            }
            Self::NotWarranted => f.write_str("no escalation warranted"),
        }
    }
}

/// Decide whether the triggered results warrant a Tier 1 assessment.
pub fn decide(triggered: &[RuleResult], direct: &[RecommendationCandidate]) -> EscalationReason {
    if let Some(flagged) = triggered.iter().find(|r| r.requires_escalation) {
        return EscalationReason::ExplicitFlag {
            rule_id: flagged.rule_id.clone(),
        };
    }

    let high = triggered
        .iter()
        .filter(|r| r.severity.is_high_or_critical())
        .count();
    if high >= HIGH_SEVERITY_COUNT {
        return EscalationReason::MultipleHighSeverity { count: high };
    }

    if let Some(detail) = find_conflict(direct) {
        return EscalationReason::ConflictingRecommendations { detail };
    }

    if triggered.len() >= COMPLEXITY_COUNT {
        return EscalationReason::ComplexityThreshold {
            triggered: triggered.len(),
        };
    }

    if direct.is_empty() {
        EscalationReason::NotWarranted
    } else {
        EscalationReason::NoEscalationUseful {
            recommendations: direct.len(),
        }
    }
}

/// Two different actions on the same entity, or a batch that says both
/// "do today" and "defer".
fn find_conflict(direct: &[RecommendationCandidate]) -> Option<String> {
    let mut by_target: HashMap<(TargetKind, &str), ActionKind> = HashMap::new();
    for candidate in direct {
        let (kind, Some(id)) = candidate.target_key() else {
            continue;
        };
        match by_target.get(&(kind, id)) {
            Some(existing) if *existing != candidate.action_kind => {
                return Some(format!(
                    "{kind} {id} has both {existing} and {}",
                    candidate.action_kind
                ));
            }
            Some(_) => {}
            None => {
                by_target.insert((kind, id), candidate.action_kind);
            }
        }
    }

    let has = |action: ActionKind| direct.iter().any(|c| c.action_kind == action);
    if has(ActionKind::ExecuteToday) && has(ActionKind::Defer) {
        return Some("batch both schedules work for today and defers work".to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_core::Severity;

    fn hit(id: &str, severity: Severity) -> RuleResult {
        RuleResult::triggered(id, severity)
    }

    fn rec(action: ActionKind, kind: TargetKind, id: &str) -> RecommendationCandidate {
        RecommendationCandidate::new(action, kind, "x").with_target(id, "x")
    }

    #[test]
    fn explicit_flag_wins_first() {
        let triggered = vec![
            hit("a", Severity::Critical),
            hit("b", Severity::Low).escalating(true),
            hit("c", Severity::High),
        ];
        assert_eq!(
            decide(&triggered, &[]),
            EscalationReason::ExplicitFlag { rule_id: "b".into() }
        );
    }

    #[test]
    fn two_high_severity_escalate() {
        let triggered = vec![hit("a", Severity::High), hit("b", Severity::Critical)];
        let reason = decide(&triggered, &[]);
        assert_eq!(reason, EscalationReason::MultipleHighSeverity { count: 2 });
        assert!(reason.escalates());
    }

    #[test]
    fn same_target_different_actions_conflict() {
        let triggered = vec![hit("a", Severity::Low), hit("b", Severity::Low)];
        let direct = vec![
            rec(ActionKind::Reschedule, TargetKind::Task, "t1"),
            rec(ActionKind::Reflect, TargetKind::Task, "t1"),
        ];
        assert!(matches!(
            decide(&triggered, &direct),
            EscalationReason::ConflictingRecommendations { .. }
        ));
    }

    #[test]
    fn execute_and_defer_in_one_batch_conflict() {
        let direct = vec![
            rec(ActionKind::ExecuteToday, TargetKind::Task, "t1"),
            rec(ActionKind::Defer, TargetKind::Task, "t2"),
        ];
        assert!(decide(&[hit("a", Severity::Low)], &direct).escalates());
    }

    #[test]
    fn targetless_recommendations_never_conflict_by_entity() {
        let direct = vec![
            RecommendationCandidate::new(ActionKind::CheckIn, TargetKind::CheckIn, "a"),
            RecommendationCandidate::new(ActionKind::Reflect, TargetKind::CheckIn, "b"),
        ];
        assert_eq!(
            decide(&[hit("a", Severity::Low)], &direct),
            EscalationReason::NoEscalationUseful { recommendations: 2 }
        );
    }

    #[test]
    fn four_triggered_is_complex() {
        let triggered: Vec<RuleResult> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| hit(id, Severity::Medium))
            .collect();
        assert_eq!(
            decide(&triggered, &[]),
            EscalationReason::ComplexityThreshold { triggered: 4 }
        );
    }

    #[test]
    fn quiet_batch_is_not_warranted() {
        let reason = decide(&[], &[]);
        assert_eq!(reason, EscalationReason::NotWarranted);
        assert!(!reason.escalates());
    }
}
