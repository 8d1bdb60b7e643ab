//! Habit adherence: seven-day completion rate below 50%.

use crate::{Rule, RuleResult, signals_for};
use serde::Serialize;
use stride_core::error::RuleError;
use stride_core::{
    ActionKind, Habit, RecommendationCandidate, RecommendationContext, RecommendationType,
    ScalingMode, Severity, SignalEntry, StateSnapshot, TargetKind,
};

pub const RULE_ID: &str = "habit_adherence";

/// Adherence below this is flagged.
pub const ADHERENCE_THRESHOLD: f64 = 0.5;

/// Adherence below this starts at medium severity.
const SEVERE_ADHERENCE: f64 = 0.25;

/// A streak at least this long is worth protecting.
const LONG_STREAK: u32 = 21;

pub struct HabitAdherenceRule;

#[derive(Debug, Serialize)]
struct Lagging {
    id: String,
    title: String,
    adherence: f64,
    streak: u32,
    scaling_mode: &'static str,
    severity: Severity,
}

fn habit_severity(habit: &Habit, adherence: f64, state: &StateSnapshot) -> Severity {
    let base = if adherence < SEVERE_ADHERENCE {
        Severity::Medium
    } else {
        Severity::Low
    };
    let steps = [
        habit.current_streak >= LONG_STREAK,
        habit.scaling_mode == ScalingMode::Minimum,
        state.links_high_priority_goal(&habit.goal_ids),
    ]
    .into_iter()
    .filter(|raise| *raise)
    .count();
    base.raised(steps as u8)
}

fn score_for(severity: Severity) -> f64 {
    match severity {
        Severity::Low => 0.55,
        Severity::Medium => 0.65,
        Severity::High => 0.78,
        Severity::Critical => 0.88,
    }
}

fn recommend(
    habit: &Habit,
    adherence: f64,
    severity: Severity,
    signals: &[SignalEntry],
) -> RecommendationCandidate {
    let pct = adherence * 100.0;
    let base = match habit.scaling_mode.smaller() {
        Some(mode) => RecommendationCandidate::new(
            ActionKind::ScaleBack,
            TargetKind::Habit,
            format!("Scale \"{}\" back to {}", habit.title, mode.as_str()),
        )
        .with_rationale(format!(
            "\"{}\" was done {:.0}% of expected days this week. A smaller version is easier to keep.",
            habit.title, pct
        ))
        .with_payload(serde_json::json!({ "habit_id": habit.id, "mode": mode.as_str() }))
        .with_summary(format!("Change scaling to {}", mode.as_str())),
        // Already at the smallest size; the habit itself needs rethinking.
        None => RecommendationCandidate::new(
            ActionKind::Reflect,
            TargetKind::Habit,
            format!("Reflect on what is blocking \"{}\"", habit.title),
        )
        .with_rationale(format!(
            "\"{}\" is at its minimum size and was still done only {:.0}% of expected days.",
            habit.title, pct
        ))
        .with_payload(serde_json::json!({ "habit_id": habit.id }))
        .with_summary("Reflect on the habit"),
    };

    base.with_type(RecommendationType::Adjustment)
        .with_context(RecommendationContext::HabitCoaching)
        .with_target(&habit.id, &habit.title)
        .with_score(score_for(severity))
        .with_signals(signals_for(signals, TargetKind::Habit, &habit.id))
        .from_rule(RULE_ID)
}

impl Rule for HabitAdherenceRule {
    fn id(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Suggest scaling back habits completed on fewer than half of expected days"
    }

    fn evaluate(
        &self,
        state: &StateSnapshot,
        signals: &[SignalEntry],
    ) -> Result<RuleResult, RuleError> {
        let mut lagging: Vec<(&Habit, f64, Severity)> = state
            .habits
            .iter()
            .filter(|h| h.status.is_open() && h.expected_last_7d > 0)
            .filter_map(|h| {
                let adherence = h.adherence_7d();
                (adherence < ADHERENCE_THRESHOLD)
                    .then(|| (h, adherence, habit_severity(h, adherence, state)))
            })
            .collect();

        if lagging.is_empty() {
            return Ok(RuleResult::not_triggered(RULE_ID)
                .with_evidence("habits_checked", state.habits.len()));
        }

        // Worst first: highest severity, then lowest adherence, then id.
        lagging.sort_by(|a, b| {
            b.2.cmp(&a.2)
                .then_with(|| a.1.total_cmp(&b.1))
                .then_with(|| a.0.id.cmp(&b.0.id))
        });

        let (habit, adherence, severity) = lagging[0];
        let evidence: Vec<Lagging> = lagging
            .iter()
            .map(|(h, a, s)| Lagging {
                id: h.id.clone(),
                title: h.title.clone(),
                adherence: *a,
                streak: h.current_streak,
                scaling_mode: h.scaling_mode.as_str(),
                severity: *s,
            })
            .collect();

        Ok(RuleResult::triggered(RULE_ID, severity)
            .with_evidence("habits_checked", state.habits.len())
            .with_evidence("lagging", serde_json::to_value(&evidence).unwrap_or_default())
            .with_recommendation(recommend(habit, adherence, severity, signals)))
    }
}
