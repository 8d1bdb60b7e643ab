//! Deadline proximity: work due within 48 hours with too little progress.
//!
//! The required progress slides linearly with time left: 50% at 48 hours,
//! 75% at 24 hours, 100% at the deadline. Anything already past due is
//! flagged regardless of progress.

use crate::{Rule, RuleResult, signals_for};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use stride_core::error::RuleError;
use stride_core::{
    ActionKind, RecommendationCandidate, RecommendationContext, RecommendationType, Severity,
    SignalEntry, StateSnapshot, TargetKind,
};

pub const RULE_ID: &str = "deadline_proximity";

/// Look-ahead window in hours.
pub const WINDOW_HOURS: f64 = 48.0;

/// Flagged-item count at which severity goes critical and Tier 1 is requested.
const CROWDED: usize = 3;

pub struct DeadlineProximityRule;

/// Required progress for an item `hours_left` from its deadline.
pub fn required_progress(hours_left: f64) -> f64 {
    (1.0 - hours_left / (2.0 * WINDOW_HOURS)).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Serialize)]
struct AtRisk {
    kind: TargetKind,
    id: String,
    title: String,
    hours_left: f64,
    progress: f64,
    required: f64,
    overdue: bool,
    #[serde(skip)]
    priority: u8,
}

struct Dated<'a> {
    kind: TargetKind,
    id: &'a str,
    title: &'a str,
    due: DateTime<Utc>,
    progress: f64,
    priority: u8,
}

fn dated_items(state: &StateSnapshot) -> Vec<Dated<'_>> {
    let tasks = state
        .tasks
        .iter()
        .filter(|t| t.status.is_open())
        .filter_map(|t| {
            t.due.map(|due| Dated {
                kind: TargetKind::Task,
                id: &t.id,
                title: &t.title,
                due,
                progress: t.progress,
                priority: t.priority,
            })
        });
    let projects = state
        .projects
        .iter()
        .filter(|p| p.status.is_open())
        .filter_map(|p| {
            p.due.map(|due| Dated {
                kind: TargetKind::Project,
                id: &p.id,
                title: &p.title,
                due,
                progress: p.progress,
                priority: state
                    .goal_priority_for(TargetKind::Project, &p.id)
                    .unwrap_or(3),
            })
        });
    let goals = state
        .goals
        .iter()
        .filter(|g| g.status.is_open())
        .filter_map(|g| {
            g.target_date.map(|due| Dated {
                kind: TargetKind::Goal,
                id: &g.id,
                title: &g.title,
                due,
                progress: g.progress,
                priority: g.priority,
            })
        });
    tasks.chain(projects).chain(goals).collect()
}

fn severity_for(items: &[AtRisk]) -> Severity {
    let critical = items.len() >= CROWDED
        || items.iter().any(|i| i.overdue || i.hours_left <= WINDOW_HOURS / 2.0);
    if critical {
        Severity::Critical
    } else if items.len() == 2 {
        Severity::High
    } else {
        Severity::Medium
    }
}

fn score_for(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 0.9,
        Severity::High => 0.8,
        _ => 0.65,
    }
}

fn recommend(
    item: &AtRisk,
    state: &StateSnapshot,
    severity: Severity,
    signals: &[SignalEntry],
) -> RecommendationCandidate {
    let (action, title, payload) = match (item.kind, item.overdue) {
        (TargetKind::Task, true) => (
            ActionKind::Reschedule,
            format!("Set a realistic new date for \"{}\"", item.title),
            serde_json::json!({
                "task_id": item.id,
                "new_due": (state.as_of + Duration::days(1)).to_rfc3339(),
            }),
        ),
        (TargetKind::Task, false) => (
            ActionKind::ExecuteToday,
            format!("Work on \"{}\" today", item.title),
            serde_json::json!({ "task_id": item.id }),
        ),
        (TargetKind::Project, _) => (
            ActionKind::ExecuteToday,
            format!("Focus on project \"{}\" today", item.title),
            serde_json::json!({ "project_id": item.id }),
        ),
        _ => (
            ActionKind::Reflect,
            format!("Revisit the target date for \"{}\"", item.title),
            serde_json::json!({ "goal_id": item.id }),
        ),
    };

    let rationale = if item.overdue {
        format!(
            "\"{}\" is past due at {:.0}% progress.",
            item.title,
            item.progress * 100.0
        )
    } else {
        format!(
            "\"{}\" is due in {:.0} hours at {:.0}% progress; about {:.0}% would be on track.",
            item.title,
            item.hours_left,
            item.progress * 100.0,
            item.required * 100.0
        )
    };

    RecommendationCandidate::new(action, item.kind, title)
        .with_type(RecommendationType::Warning)
        .with_context(RecommendationContext::DeadlineRisk)
        .with_target(&item.id, &item.title)
        .with_rationale(rationale)
        .with_score(score_for(severity))
        .with_payload(payload)
        .with_summary(format!("{} {}", action, item.kind))
        .with_signals(signals_for(signals, item.kind, &item.id))
        .from_rule(RULE_ID)
}

impl Rule for DeadlineProximityRule {
    fn id(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Flag tasks, projects and goals due within 48 hours without enough progress"
    }

    fn evaluate(
        &self,
        state: &StateSnapshot,
        signals: &[SignalEntry],
    ) -> Result<RuleResult, RuleError> {
        let dated = dated_items(state);
        let checked = dated.len();

        let mut at_risk: Vec<AtRisk> = dated
            .into_iter()
            .filter_map(|d| {
                let hours_left = (d.due - state.as_of).num_minutes() as f64 / 60.0;
                let overdue = hours_left <= 0.0;
                if !overdue && hours_left > WINDOW_HOURS {
                    return None;
                }
                let required = required_progress(hours_left.max(0.0));
                (overdue || d.progress < required).then(|| AtRisk {
                    kind: d.kind,
                    id: d.id.to_string(),
                    title: d.title.to_string(),
                    hours_left,
                    progress: d.progress,
                    required,
                    overdue,
                    priority: d.priority,
                })
            })
            .collect();

        if at_risk.is_empty() {
            return Ok(RuleResult::not_triggered(RULE_ID).with_evidence("items_checked", checked));
        }

        // Most urgent first: least time left, then priority, then id.
        at_risk.sort_by(|a, b| {
            a.hours_left
                .total_cmp(&b.hours_left)
                .then_with(|| a.priority.cmp(&b.priority))
                .then_with(|| a.id.cmp(&b.id))
        });

        let severity = severity_for(&at_risk);
        let candidate = recommend(&at_risk[0], state, severity, signals);

        Ok(RuleResult::triggered(RULE_ID, severity)
            .with_evidence("items_checked", checked)
            .with_evidence(
                "at_risk",
                serde_json::to_value(&at_risk).unwrap_or_default(),
            )
            .with_evidence("overdue", at_risk.iter().filter(|i| i.overdue).count())
            .escalating(at_risk.len() >= CROWDED)
            .with_recommendation(candidate))
    }
}
