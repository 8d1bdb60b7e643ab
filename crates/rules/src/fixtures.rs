//! Snapshot builders shared by rule tests.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use stride_core::{
    Cadence, CheckIn, CheckInKind, EnergyLevel, EntityStatus, Goal, Habit, MetricDefinition,
    ScalingMode, SignalEntry, SignalType, StateSnapshot, Task,
};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap()
}

pub fn today() -> NaiveDate {
    now().date_naive()
}

pub fn state() -> StateSnapshot {
    StateSnapshot::empty("u1", now())
}

pub fn goal(id: &str, priority: u8) -> Goal {
    Goal {
        id: id.into(),
        title: format!("Goal {id}"),
        status: EntityStatus::Active,
        priority,
        target_date: None,
        progress: 0.0,
    }
}

pub fn task(id: &str) -> Task {
    Task {
        id: id.into(),
        title: format!("Task {id}"),
        status: EntityStatus::Active,
        priority: 3,
        due: None,
        scheduled_for: None,
        progress: 0.0,
        energy: EnergyLevel::Medium,
        estimated_minutes: None,
        tags: vec![],
        reschedule_count: 0,
        project_id: None,
        goal_id: None,
    }
}

pub fn due_in(mut t: Task, hours: i64, progress: f64) -> Task {
    t.due = Some(now() + Duration::hours(hours));
    t.progress = progress;
    t
}

pub fn habit(id: &str, completed: u32, expected: u32) -> Habit {
    Habit {
        id: id.into(),
        title: format!("Habit {id}"),
        status: EntityStatus::Active,
        scaling_mode: ScalingMode::Standard,
        completed_last_7d: completed,
        expected_last_7d: expected,
        current_streak: 0,
        goal_ids: vec![],
    }
}

pub fn metric(id: &str, cadence: Cadence, days_since_observation: i64) -> MetricDefinition {
    MetricDefinition {
        id: id.into(),
        name: format!("Metric {id}"),
        cadence,
        status: EntityStatus::Active,
        created_at: now() - Duration::days(365),
        last_manual_observation: Some(now() - Duration::days(days_since_observation)),
        goal_ids: vec![],
    }
}

pub fn check_in(kind: CheckInKind, energy: Option<u8>) -> CheckIn {
    CheckIn {
        id: format!("c-{}", kind.as_str()),
        kind,
        date: today(),
        energy,
        mood: None,
    }
}

pub fn signal(id: &str, signal_type: SignalType) -> SignalEntry {
    SignalEntry::new(id, signal_type, now())
}
