//! Domain commands issued by the action dispatcher.

use crate::error::CommandError;
use crate::snapshot::{CheckInKind, ScalingMode};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One concrete domain operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DomainCommand {
    CreateTask {
        title: String,
        #[serde(default)]
        goal_id: Option<String>,
        #[serde(default)]
        due: Option<DateTime<Utc>>,
    },
    ScheduleTaskForToday {
        task_id: String,
    },
    DeferTask {
        task_id: String,
        until: NaiveDate,
    },
    RescheduleTask {
        task_id: String,
        new_due: DateTime<Utc>,
    },
    ChangeHabitScaling {
        habit_id: String,
        mode: ScalingMode,
    },
    StartCheckIn {
        kind: CheckInKind,
    },
    RequestMetricObservation {
        metric_id: String,
    },
    FocusProject {
        project_id: String,
    },
}

impl DomainCommand {
    pub fn name(&self) -> &'static str {
        match self {
            DomainCommand::CreateTask { .. } => "create_task",
            DomainCommand::ScheduleTaskForToday { .. } => "schedule_task_for_today",
            DomainCommand::DeferTask { .. } => "defer_task",
            DomainCommand::RescheduleTask { .. } => "reschedule_task",
            DomainCommand::ChangeHabitScaling { .. } => "change_habit_scaling",
            DomainCommand::StartCheckIn { .. } => "start_check_in",
            DomainCommand::RequestMetricObservation { .. } => "request_metric_observation",
            DomainCommand::FocusProject { .. } => "focus_project",
        }
    }
}

/// Result of a command. Commands that touch no entity return `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub entity_id: Option<String>,
}

/// Send a command, get a result.
#[async_trait]
pub trait CommandBus: Send + Sync {
    async fn send(&self, command: DomainCommand) -> Result<CommandOutcome, CommandError>;
}
