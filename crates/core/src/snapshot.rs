//! The read-only state snapshot consumed by the pipeline.
//!
//! A snapshot captures one user's goals, habits, tasks, projects,
//! experiments, check-ins, and metric definitions as of `as_of`. Rules may
//! only read the clock through `as_of` and `local_date`.

use crate::error::SnapshotError;
use crate::recommendation::TargetKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Lifecycle status shared by goals, habits, tasks, projects and metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    #[default]
    Active,
    Paused,
    Completed,
    Archived,
}

impl EntityStatus {
    pub fn is_open(self) -> bool {
        matches!(self, EntityStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: EntityStatus,
    /// 1 is the highest priority.
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub target_date: Option<DateTime<Utc>>,
    /// Fraction complete in `[0, 1]`.
    #[serde(default)]
    pub progress: f64,
}

/// How much of a habit the user is currently committing to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMode {
    Minimum,
    Reduced,
    #[default]
    Standard,
    Stretch,
}

impl ScalingMode {
    /// The next smaller mode, or None at `Minimum`.
    pub fn smaller(self) -> Option<ScalingMode> {
        match self {
            ScalingMode::Stretch => Some(ScalingMode::Standard),
            ScalingMode::Standard => Some(ScalingMode::Reduced),
            ScalingMode::Reduced => Some(ScalingMode::Minimum),
            ScalingMode::Minimum => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScalingMode::Minimum => "minimum",
            ScalingMode::Reduced => "reduced",
            ScalingMode::Standard => "standard",
            ScalingMode::Stretch => "stretch",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub scaling_mode: ScalingMode,
    /// Completions logged over the trailing seven days.
    #[serde(default)]
    pub completed_last_7d: u32,
    /// Completions the schedule expected over the same window.
    #[serde(default)]
    pub expected_last_7d: u32,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub goal_ids: Vec<String>,
}

impl Habit {
    /// Trailing seven-day adherence in `[0, 1]`. A habit with nothing
    /// expected is fully adherent.
    pub fn adherence_7d(&self) -> f64 {
        if self.expected_last_7d == 0 {
            return 1.0;
        }
        (f64::from(self.completed_last_7d) / f64::from(self.expected_last_7d)).min(1.0)
    }
}

/// Energy a task demands, or energy the user reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: EntityStatus,
    /// 1 is the highest priority.
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_for: Option<NaiveDate>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub energy: EnergyLevel,
    #[serde(default)]
    pub estimated_minutes: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub reschedule_count: u32,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub goal_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub goal_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub status: EntityStatus,
    #[serde(default)]
    pub hypothesis: String,
    pub starts_on: NaiveDate,
    #[serde(default)]
    pub ends_on: Option<NaiveDate>,
    #[serde(default)]
    pub goal_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInKind {
    Morning,
    Evening,
}

impl CheckInKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckInKind::Morning => "morning",
            CheckInKind::Evening => "evening",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckIn {
    pub id: String,
    pub kind: CheckInKind,
    pub date: NaiveDate,
    /// Self-reported energy, 1 (drained) to 5 (energized).
    #[serde(default)]
    pub energy: Option<u8>,
    #[serde(default)]
    pub mood: Option<u8>,
}

/// Expected observation cadence of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
}

impl Cadence {
    pub fn days(self) -> i64 {
        match self {
            Cadence::Daily => 1,
            Cadence::Weekly => 7,
            Cadence::Biweekly => 14,
            Cadence::Monthly => 30,
            Cadence::Quarterly => 90,
        }
    }

    /// Slack allowed past the cadence before an observation counts as overdue.
    pub fn grace_days(self) -> i64 {
        match self {
            Cadence::Daily => 1,
            Cadence::Weekly => 2,
            Cadence::Biweekly => 3,
            Cadence::Monthly => 5,
            Cadence::Quarterly => 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: String,
    pub name: String,
    pub cadence: Cadence,
    #[serde(default)]
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_manual_observation: Option<DateTime<Utc>>,
    #[serde(default)]
    pub goal_ids: Vec<String>,
}

fn default_priority() -> u8 {
    3
}

/// An immutable view of one user's data as of `as_of`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub user_id: String,
    pub as_of: DateTime<Utc>,
    /// The user's calendar date at `as_of`.
    pub local_date: NaiveDate,
    #[serde(default = "default_capacity")]
    pub daily_capacity_minutes: u32,
    #[serde(default)]
    pub check_in_streak: u32,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub habits: Vec<Habit>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub experiments: Vec<Experiment>,
    #[serde(default)]
    pub check_ins: Vec<CheckIn>,
    #[serde(default)]
    pub metrics: Vec<MetricDefinition>,
}

fn default_capacity() -> u32 {
    480
}

impl StateSnapshot {
    /// An empty snapshot for `user_id` at `as_of`.
    pub fn empty(user_id: impl Into<String>, as_of: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            as_of,
            local_date: as_of.date_naive(),
            daily_capacity_minutes: default_capacity(),
            check_in_streak: 0,
            goals: Vec::new(),
            habits: Vec::new(),
            tasks: Vec::new(),
            projects: Vec::new(),
            experiments: Vec::new(),
            check_ins: Vec::new(),
            metrics: Vec::new(),
        }
    }

    pub fn goal(&self, id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn habit(&self, id: &str) -> Option<&Habit> {
        self.habits.iter().find(|h| h.id == id)
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn metric(&self, id: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|m| m.id == id)
    }

    /// Whether any of `goal_ids` is an open priority-1 or priority-2 goal.
    pub fn links_high_priority_goal<'a>(&self, goal_ids: impl IntoIterator<Item = &'a String>) -> bool {
        goal_ids
            .into_iter()
            .filter_map(|id| self.goal(id))
            .any(|g| g.status.is_open() && g.priority <= 2)
    }

    /// Best (lowest number) goal priority reachable from a target entity.
    pub fn goal_priority_for(&self, kind: TargetKind, id: &str) -> Option<u8> {
        let goal_ids: Vec<&String> = match kind {
            TargetKind::Goal => return self.goal(id).map(|g| g.priority),
            TargetKind::Task => self
                .task(id)
                .and_then(|t| {
                    t.goal_id.as_ref().or_else(|| {
                        t.project_id
                            .as_deref()
                            .and_then(|p| self.project(p))
                            .and_then(|p| p.goal_id.as_ref())
                    })
                })
                .into_iter()
                .collect(),
            TargetKind::Habit => self.habit(id).map(|h| h.goal_ids.iter().collect()).unwrap_or_default(),
            TargetKind::Project => self.project(id).and_then(|p| p.goal_id.as_ref()).into_iter().collect(),
            TargetKind::Experiment => self
                .experiments
                .iter()
                .find(|e| e.id == id)
                .and_then(|e| e.goal_id.as_ref())
                .into_iter()
                .collect(),
            TargetKind::Metric => self.metric(id).map(|m| m.goal_ids.iter().collect()).unwrap_or_default(),
            TargetKind::CheckIn => Vec::new(),
        };
        goal_ids
            .into_iter()
            .filter_map(|gid| self.goal(gid))
            .map(|g| g.priority)
            .min()
    }

    /// Whether an entity of `kind` with `id` is present in this snapshot.
    pub fn contains_entity(&self, kind: TargetKind, id: &str) -> bool {
        match kind {
            TargetKind::Task => self.task(id).is_some(),
            TargetKind::Habit => self.habit(id).is_some(),
            TargetKind::Goal => self.goal(id).is_some(),
            TargetKind::Project => self.project(id).is_some(),
            TargetKind::Experiment => self.experiments.iter().any(|e| e.id == id),
            TargetKind::CheckIn => self.check_ins.iter().any(|c| c.id == id),
            TargetKind::Metric => self.metric(id).is_some(),
        }
    }

    /// Today's check-in of the given kind, if recorded.
    pub fn check_in_today(&self, kind: CheckInKind) -> Option<&CheckIn> {
        self.check_ins
            .iter()
            .find(|c| c.kind == kind && c.date == self.local_date)
    }

    /// Energy reported today; the morning check-in wins over the evening one.
    pub fn energy_today(&self) -> Option<u8> {
        self.check_in_today(CheckInKind::Morning)
            .and_then(|c| c.energy)
            .or_else(|| self.check_in_today(CheckInKind::Evening).and_then(|c| c.energy))
    }

    /// Check that every child collection only references entities present
    /// in this snapshot and that ids are unique per kind.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        fn unique<'a>(kind: &str, ids: impl Iterator<Item = &'a str>) -> Result<(), SnapshotError> {
            let mut seen = HashSet::new();
            for id in ids {
                if !seen.insert(id) {
                    return Err(SnapshotError::DuplicateId {
                        kind: kind.into(),
                        id: id.into(),
                    });
                }
            }
            Ok(())
        }

        unique("goal", self.goals.iter().map(|g| g.id.as_str()))?;
        unique("habit", self.habits.iter().map(|h| h.id.as_str()))?;
        unique("task", self.tasks.iter().map(|t| t.id.as_str()))?;
        unique("project", self.projects.iter().map(|p| p.id.as_str()))?;
        unique("metric", self.metrics.iter().map(|m| m.id.as_str()))?;

        let dangling = |kind: &str, id: &str, missing_kind: &str, missing_id: &str| {
            SnapshotError::DanglingReference {
                kind: kind.into(),
                id: id.into(),
                missing_kind: missing_kind.into(),
                missing_id: missing_id.into(),
            }
        };

        for habit in &self.habits {
            if let Some(gid) = habit.goal_ids.iter().find(|g| self.goal(g).is_none()) {
                return Err(dangling("habit", &habit.id, "goal", gid));
            }
        }
        for task in &self.tasks {
            if let Some(gid) = task.goal_id.as_deref().filter(|g| self.goal(g).is_none()) {
                return Err(dangling("task", &task.id, "goal", gid));
            }
            if let Some(pid) = task.project_id.as_deref().filter(|p| self.project(p).is_none()) {
                return Err(dangling("task", &task.id, "project", pid));
            }
        }
        for project in &self.projects {
            if let Some(gid) = project.goal_id.as_deref().filter(|g| self.goal(g).is_none()) {
                return Err(dangling("project", &project.id, "goal", gid));
            }
        }
        for experiment in &self.experiments {
            if let Some(gid) = experiment.goal_id.as_deref().filter(|g| self.goal(g).is_none()) {
                return Err(dangling("experiment", &experiment.id, "goal", gid));
            }
        }
        for metric in &self.metrics {
            if let Some(gid) = metric.goal_ids.iter().find(|g| self.goal(g).is_none()) {
                return Err(dangling("metric", &metric.id, "goal", gid));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap()
    }

    fn goal(id: &str, priority: u8) -> Goal {
        Goal {
            id: id.into(),
            title: format!("Goal {id}"),
            status: EntityStatus::Active,
            priority,
            target_date: None,
            progress: 0.0,
        }
    }

    #[test]
    fn adherence_handles_empty_schedule() {
        let habit = Habit {
            id: "h1".into(),
            title: "Stretch".into(),
            status: EntityStatus::Active,
            scaling_mode: ScalingMode::Standard,
            completed_last_7d: 0,
            expected_last_7d: 0,
            current_streak: 0,
            goal_ids: vec![],
        };
        assert_eq!(habit.adherence_7d(), 1.0);
        let habit = Habit { completed_last_7d: 2, expected_last_7d: 7, ..habit };
        assert!((habit.adherence_7d() - 2.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn scaling_mode_shrinks_to_minimum() {
        assert_eq!(ScalingMode::Stretch.smaller(), Some(ScalingMode::Standard));
        assert_eq!(ScalingMode::Reduced.smaller(), Some(ScalingMode::Minimum));
        assert_eq!(ScalingMode::Minimum.smaller(), None);
    }

    #[test]
    fn validate_rejects_dangling_goal() {
        let mut state = StateSnapshot::empty("u1", now());
        state.metrics.push(MetricDefinition {
            id: "m1".into(),
            name: "Weight".into(),
            cadence: Cadence::Weekly,
            status: EntityStatus::Active,
            created_at: now(),
            last_manual_observation: None,
            goal_ids: vec!["missing".into()],
        });
        assert!(matches!(
            state.validate(),
            Err(SnapshotError::DanglingReference { .. })
        ));
        state.goals.push(goal("missing", 1));
        assert!(state.validate().is_ok());
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let mut state = StateSnapshot::empty("u1", now());
        state.goals.push(goal("g1", 1));
        state.goals.push(goal("g1", 2));
        assert!(matches!(state.validate(), Err(SnapshotError::DuplicateId { .. })));
    }

    #[test]
    fn high_priority_goal_links() {
        let mut state = StateSnapshot::empty("u1", now());
        state.goals.push(goal("g1", 1));
        state.goals.push(goal("g3", 3));
        assert!(state.links_high_priority_goal(&["g1".to_string()]));
        assert!(!state.links_high_priority_goal(&["g3".to_string()]));
        assert_eq!(state.goal_priority_for(TargetKind::Goal, "g3"), Some(3));
    }

    #[test]
    fn energy_prefers_morning_check_in() {
        let mut state = StateSnapshot::empty("u1", now());
        state.check_ins.push(CheckIn {
            id: "c1".into(),
            kind: CheckInKind::Evening,
            date: state.local_date,
            energy: Some(4),
            mood: None,
        });
        assert_eq!(state.energy_today(), Some(4));
        state.check_ins.push(CheckIn {
            id: "c2".into(),
            kind: CheckInKind::Morning,
            date: state.local_date,
            energy: Some(1),
            mood: None,
        });
        assert_eq!(state.energy_today(), Some(1));
    }

    #[test]
    fn snapshot_deserializes_with_defaults() {
        let state: StateSnapshot = serde_json::from_value(serde_json::json!({
            "user_id": "u1",
            "as_of": "2026-03-10T08:00:00Z",
            "local_date": "2026-03-10"
        }))
        .unwrap();
        assert_eq!(state.daily_capacity_minutes, 480);
        assert!(state.tasks.is_empty());
    }
}
