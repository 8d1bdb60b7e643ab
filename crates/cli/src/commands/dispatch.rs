//! `stride dispatch`: run recommendations through the action dispatcher.
//!
//! There is no domain backend behind the CLI, so commands go to a bus that
//! logs them and echoes the target id back.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use stride_core::error::CommandError;
use stride_core::{CommandBus, CommandOutcome, DomainCommand, RecommendationCandidate};
use stride_engine::ActionDispatcher;
use tracing::info;

use super::{OneOrMany, read_json};

/// Command bus that logs every command instead of applying it.
#[derive(Default)]
pub struct LoggingBus;

#[async_trait]
impl CommandBus for LoggingBus {
    async fn send(&self, command: DomainCommand) -> Result<CommandOutcome, CommandError> {
        let body = serde_json::to_string(&command).map_err(|e| CommandError::Transport(e.to_string()))?;
        info!(command = command.name(), %body, "Command issued");
        let entity_id = match command {
            DomainCommand::CreateTask { .. } | DomainCommand::StartCheckIn { .. } => {
                Some(uuid::Uuid::new_v4().to_string())
            }
            DomainCommand::ScheduleTaskForToday { task_id }
            | DomainCommand::DeferTask { task_id, .. }
            | DomainCommand::RescheduleTask { task_id, .. } => Some(task_id),
            DomainCommand::ChangeHabitScaling { habit_id, .. } => Some(habit_id),
            DomainCommand::RequestMetricObservation { metric_id } => Some(metric_id),
            DomainCommand::FocusProject { project_id } => Some(project_id),
        };
        Ok(CommandOutcome { entity_id })
    }
}

pub async fn run(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let recommendations = read_json::<OneOrMany<RecommendationCandidate>>(path)?.into_vec();
    let dispatcher = ActionDispatcher::new(Arc::new(LoggingBus));
    dispatch_all(&dispatcher, &recommendations).await;
    Ok(())
}

/// Execute each recommendation and print one line per result.
pub async fn dispatch_all(dispatcher: &ActionDispatcher, recommendations: &[RecommendationCandidate]) {
    for (i, rec) in recommendations.iter().enumerate() {
        let label = format!("{} {}", rec.action_kind, rec.target_kind);
        match dispatcher.execute(rec).await {
            Some(entity_id) => println!("  {}. {label} \"{}\" -> {entity_id}", i + 1, rec.title),
            None if rec.action_kind.is_passive() => {
                println!("  {}. {label} \"{}\" (passive, nothing to do)", i + 1, rec.title)
            }
            None => println!("  {}. {label} \"{}\" (not dispatched)", i + 1, rec.title),
        }
    }
}
