//! Energy mismatch: low reported energy on a day packed with demanding work.

use crate::{Rule, RuleResult, signals_for};
use chrono::Duration;
use stride_core::error::RuleError;
use stride_core::{
    ActionKind, EnergyLevel, RecommendationCandidate, RecommendationContext, RecommendationType,
    Severity, SignalEntry, StateSnapshot, TargetKind, Task,
};

pub const RULE_ID: &str = "energy_mismatch";

/// Reported energy (1-5) at or below this counts as low.
pub const LOW_ENERGY: u8 = 2;

/// Estimate used for tasks without one.
const DEFAULT_ESTIMATE_MINUTES: u32 = 30;

pub struct EnergyMismatchRule;

fn scheduled_today(task: &Task, state: &StateSnapshot) -> bool {
    match task.scheduled_for {
        Some(day) => day == state.local_date,
        None => task.due.is_some_and(|due| due.date_naive() == state.local_date),
    }
}

/// High priority and due within a day; never proposed for deferral.
fn is_critical(task: &Task, state: &StateSnapshot) -> bool {
    task.priority <= 2
        && task
            .due
            .is_some_and(|due| due - state.as_of <= Duration::hours(24))
}

fn estimate(task: &Task) -> u32 {
    task.estimated_minutes.unwrap_or(DEFAULT_ESTIMATE_MINUTES)
}

fn severity_for(energy: u8, capacity_fraction: f64, has_priority_task: bool) -> Severity {
    let mut points = match energy {
        0 | 1 => 2,
        _ => 1,
    };
    if capacity_fraction >= 0.6 {
        points += 2;
    } else if capacity_fraction >= 0.3 {
        points += 1;
    }
    if has_priority_task {
        points += 1;
    }
    match points {
        p if p >= 4 => Severity::Critical,
        3 => Severity::High,
        2 => Severity::Medium,
        _ => Severity::Low,
    }
}

impl Rule for EnergyMismatchRule {
    fn id(&self) -> &str {
        RULE_ID
    }

    fn description(&self) -> &str {
        "Suggest deferring demanding work when today's reported energy is low"
    }

    fn evaluate(
        &self,
        state: &StateSnapshot,
        signals: &[SignalEntry],
    ) -> Result<RuleResult, RuleError> {
        let Some(energy) = state.energy_today() else {
            return Ok(RuleResult::not_triggered(RULE_ID).with_evidence("reason", "no_energy_report"));
        };
        if energy > LOW_ENERGY {
            return Ok(RuleResult::not_triggered(RULE_ID).with_evidence("energy", energy));
        }

        let demanding: Vec<&Task> = state
            .tasks
            .iter()
            .filter(|t| t.status.is_open() && t.energy == EnergyLevel::High)
            .filter(|t| scheduled_today(t, state))
            .collect();

        if demanding.is_empty() {
            return Ok(RuleResult::not_triggered(RULE_ID)
                .with_evidence("energy", energy)
                .with_evidence("demanding_tasks", 0));
        }

        let minutes: u32 = demanding.iter().map(|t| estimate(t)).sum();
        let capacity = state.daily_capacity_minutes.max(1);
        let capacity_fraction = f64::from(minutes) / f64::from(capacity);
        let has_priority_task = demanding.iter().any(|t| t.priority <= 2);
        let severity = severity_for(energy, capacity_fraction, has_priority_task);

        let mut result = RuleResult::triggered(RULE_ID, severity)
            .with_evidence("energy", energy)
            .with_evidence(
                "demanding_tasks",
                demanding.iter().map(|t| t.id.clone()).collect::<Vec<_>>(),
            )
            .with_evidence("demanding_minutes", minutes)
            .with_evidence("capacity_fraction", capacity_fraction);

        // Least important first, then the biggest chunk of time.
        let deferrable = demanding
            .iter()
            .filter(|t| !is_critical(t, state))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| estimate(a).cmp(&estimate(b)))
                    .then_with(|| b.id.cmp(&a.id))
            });

        if let Some(task) = deferrable {
            let until = state.local_date + Duration::days(1);
            let candidate = RecommendationCandidate::new(
                ActionKind::Defer,
                TargetKind::Task,
                format!("Move \"{}\" to tomorrow", task.title),
            )
            .with_type(RecommendationType::Adjustment)
            .with_context(RecommendationContext::EnergyManagement)
            .with_target(&task.id, &task.title)
            .with_rationale(format!(
                "You reported energy {energy}/5 and have {minutes} minutes of demanding work planned today."
            ))
            .with_score(0.5 + 0.4 * severity.weight())
            .with_payload(serde_json::json!({
                "task_id": task.id,
                "until": until.to_string(),
            }))
            .with_summary("Defer the task by one day")
            .with_signals(signals_for(signals, TargetKind::Task, &task.id))
            .from_rule(RULE_ID);
            result = result.with_recommendation(candidate);
        } else {
            result = result.with_evidence("reason", "nothing_deferrable");
        }

        Ok(result)
    }
}
