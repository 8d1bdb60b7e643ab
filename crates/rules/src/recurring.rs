//! Recurring task staleness: routine chores left to slide, or tasks that
//! keep getting pushed.

use crate::{Rule, RuleResult, signals_for};
use regex_lite::Regex;
use serde::Serialize;
use std::sync::LazyLock;
use stride_core::error::RuleError;
use stride_core::{
    ActionKind, RecommendationCandidate, RecommendationContext, RecommendationType, Severity,
    SignalEntry, StateSnapshot, TargetKind, Task,
};

pub const RULE_ID: &str = "recurring_task_staleness";

/// Reschedules after which a task counts as stale.
const STALE_RESCHEDULES: u32 = 2;

/// Reschedules after which the task itself should be questioned.
const CHRONIC_RESCHEDULES: u32 = 5;

const ROUTINE_TAGS: &[&str] = &["routine", "recurring", "daily", "weekly", "chore"];

static ROUTINE_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(daily|weekly|every|routine|recurring|chore|laundry|groceries|clean|review|standup)\b",
    )
    .unwrap()
});

pub struct RecurringStalenessRule;

/// Whether a task looks like a routine by tag or title.
pub fn is_routine(task: &Task) -> bool {
    task.tags
        .iter()
        .any(|t| ROUTINE_TAGS.contains(&t.to_lowercase().as_str()))
        || ROUTINE_TITLE.is_match(&task.title)
}

#[derive(Debug, Serialize)]
struct Stale<'a> {
    id: &'a str,
    title: &'a str,
    reschedule_count: u32,
    routine: bool,
    overdue: bool,
}

impl Rule for RecurringStalenessRule {
    fn id(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Flag routine tasks that are overdue and tasks rescheduled repeatedly"
    }

    fn evaluate(
        &self,
        state: &StateSnapshot,
        signals: &[SignalEntry],
    ) -> Result<RuleResult, RuleError> {
        let mut stale: Vec<Stale<'_>> = state
            .tasks
            .iter()
            .filter(|t| t.status.is_open())
            .filter_map(|t| {
                let routine = is_routine(t);
                let overdue = t.due.is_some_and(|due| due < state.as_of);
                (t.reschedule_count >= STALE_RESCHEDULES || (routine && overdue)).then(|| Stale {
                    id: &t.id,
                    title: &t.title,
                    reschedule_count: t.reschedule_count,
                    routine,
                    overdue,
                })
            })
            .collect();

        if stale.is_empty() {
            return Ok(RuleResult::not_triggered(RULE_ID)
                .with_evidence("tasks_checked", state.tasks.len()));
        }

        stale.sort_by(|a, b| {
            b.reschedule_count
                .cmp(&a.reschedule_count)
                .then_with(|| b.overdue.cmp(&a.overdue))
                .then_with(|| a.id.cmp(b.id))
        });
        let top = &stale[0];

        let (severity, candidate) = if top.reschedule_count >= CHRONIC_RESCHEDULES {
            (
                Severity::High,
                RecommendationCandidate::new(
                    ActionKind::Reflect,
                    TargetKind::Task,
                    format!("Decide whether \"{}\" still matters", top.title),
                )
                .with_type(RecommendationType::Insight)
                .with_rationale(format!(
                    "\"{}\" has been rescheduled {} times. It may need to be split, delegated or dropped.",
                    top.title, top.reschedule_count
                ))
                .with_score(0.7)
                .with_summary("Reflect on the task"),
            )
        } else if top.reschedule_count >= STALE_RESCHEDULES {
            (
                Severity::Medium,
                RecommendationCandidate::new(
                    ActionKind::ExecuteToday,
                    TargetKind::Task,
                    format!("Get \"{}\" done today", top.title),
                )
                .with_type(RecommendationType::Nudge)
                .with_rationale(format!(
                    "\"{}\" has been pushed {} times already.",
                    top.title, top.reschedule_count
                ))
                .with_score(0.6)
                .with_summary("Schedule the task for today"),
            )
        } else {
            (
                Severity::Low,
                RecommendationCandidate::new(
                    ActionKind::ExecuteToday,
                    TargetKind::Task,
                    format!("Catch up on \"{}\"", top.title),
                )
                .with_type(RecommendationType::Nudge)
                .with_rationale(format!("The routine \"{}\" is overdue.", top.title))
                .with_score(0.5)
                .with_summary("Schedule the task for today"),
            )
        };

        let candidate = candidate
            .with_context(RecommendationContext::Routine)
            .with_target(top.id, top.title)
            .with_payload(serde_json::json!({ "task_id": top.id }))
            .with_signals(signals_for(signals, TargetKind::Task, top.id))
            .from_rule(RULE_ID);

        Ok(RuleResult::triggered(RULE_ID, severity)
            .with_evidence("tasks_checked", state.tasks.len())
            .with_evidence("stale", serde_json::to_value(&stale).unwrap_or_default())
            .with_recommendation(candidate))
    }
}
