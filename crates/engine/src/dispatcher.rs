//! Turns an accepted recommendation into a domain command.
//!
//! Handlers are looked up by [`DispatchKey`]; each one reads the opaque
//! `action_payload` for its key. Missing handlers, payload errors and bus
//! failures are logged and yield no entity.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use stride_core::{
    ActionKind, CheckInKind, CommandBus, DomainCommand, RecommendationCandidate, ScalingMode,
    TargetKind,
};
use tracing::{debug, info, warn};

/// Lookup key for a dispatch handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    pub action: ActionKind,
    pub target: TargetKind,
}

impl DispatchKey {
    pub const fn new(action: ActionKind, target: TargetKind) -> Self {
        Self { action, target }
    }

    pub fn of(candidate: &RecommendationCandidate) -> Self {
        Self::new(candidate.action_kind, candidate.target_kind)
    }
}

impl std::fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.action, self.target)
    }
}

#[derive(Debug, thiserror::Error)]
enum PayloadError {
    #[error("payload does not match: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("no {0} in payload or target")]
    MissingId(&'static str),
}

/// Builds a command from a recommendation.
type Handler = fn(&RecommendationCandidate) -> Result<DomainCommand, PayloadError>;

pub struct ActionDispatcher {
    bus: Arc<dyn CommandBus>,
    handlers: HashMap<DispatchKey, Handler>,
}

impl ActionDispatcher {
    pub fn new(bus: Arc<dyn CommandBus>) -> Self {
        let mut handlers: HashMap<DispatchKey, Handler> = HashMap::new();
        handlers.insert(DispatchKey::new(ActionKind::Create, TargetKind::Task), create_task);
        handlers.insert(DispatchKey::new(ActionKind::ExecuteToday, TargetKind::Task), schedule_task);
        handlers.insert(DispatchKey::new(ActionKind::ExecuteToday, TargetKind::Project), focus_project);
        handlers.insert(DispatchKey::new(ActionKind::Defer, TargetKind::Task), defer_task);
        handlers.insert(DispatchKey::new(ActionKind::Reschedule, TargetKind::Task), reschedule_task);
        handlers.insert(DispatchKey::new(ActionKind::ScaleBack, TargetKind::Habit), scale_back_habit);
        handlers.insert(DispatchKey::new(ActionKind::CheckIn, TargetKind::CheckIn), start_check_in);
        handlers.insert(DispatchKey::new(ActionKind::LogObservation, TargetKind::Metric), request_observation);
        Self { bus, handlers }
    }

    pub fn supports(&self, key: DispatchKey) -> bool {
        self.handlers.contains_key(&key)
    }

    /// Supported keys, sorted for display.
    pub fn supported_keys(&self) -> Vec<DispatchKey> {
        let mut keys: Vec<DispatchKey> = self.handlers.keys().copied().collect();
        keys.sort_by_key(|k| (k.action.as_str(), k.target.as_str()));
        keys
    }

    /// Execute the recommendation's action. Returns the id of the entity
    /// the command touched, if any.
    pub async fn execute(&self, recommendation: &RecommendationCandidate) -> Option<String> {
        let key = DispatchKey::of(recommendation);
        if recommendation.action_kind.is_passive() {
            debug!(%key, "Passive action; nothing to dispatch");
            return None;
        }
        let Some(handler) = self.handlers.get(&key) else {
            warn!(%key, "No dispatch handler");
            return None;
        };

        let command = match handler(recommendation) {
            Ok(command) => command,
            Err(e) => {
                warn!(%key, error = %e, "Could not build command from payload");
                return None;
            }
        };

        let name = command.name();
        match self.bus.send(command).await {
            Ok(outcome) => {
                info!(%key, command = name, entity = ?outcome.entity_id, "Dispatched");
                outcome.entity_id
            }
            Err(e) => {
                warn!(%key, command = name, error = %e, "Command failed");
                None
            }
        }
    }
}

fn payload<T: DeserializeOwned>(candidate: &RecommendationCandidate) -> Result<T, PayloadError> {
    let value = match &candidate.action_payload {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other.clone(),
    };
    Ok(serde_json::from_value(value)?)
}

/// Payload id, falling back to the candidate's target.
fn entity_id(
    from_payload: Option<String>,
    candidate: &RecommendationCandidate,
    name: &'static str,
) -> Result<String, PayloadError> {
    from_payload
        .or_else(|| candidate.target_entity_id.clone())
        .ok_or(PayloadError::MissingId(name))
}

#[derive(Deserialize)]
struct NewTask {
    title: Option<String>,
    #[serde(default)]
    goal_id: Option<String>,
    #[serde(default)]
    due: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct TaskRef {
    task_id: Option<String>,
}

#[derive(Deserialize)]
struct Deferral {
    task_id: Option<String>,
    until: NaiveDate,
}

#[derive(Deserialize)]
struct Reschedule {
    task_id: Option<String>,
    new_due: DateTime<Utc>,
}

#[derive(Deserialize)]
struct Scaling {
    habit_id: Option<String>,
    mode: ScalingMode,
}

#[derive(Deserialize)]
struct CheckInStart {
    kind: CheckInKind,
}

#[derive(Deserialize)]
struct MetricRef {
    metric_id: Option<String>,
}

#[derive(Deserialize)]
struct ProjectRef {
    project_id: Option<String>,
}

fn create_task(c: &RecommendationCandidate) -> Result<DomainCommand, PayloadError> {
    let p: NewTask = payload(c)?;
    Ok(DomainCommand::CreateTask {
        title: p.title.unwrap_or_else(|| c.title.clone()),
        goal_id: p.goal_id,
        due: p.due,
    })
}

fn schedule_task(c: &RecommendationCandidate) -> Result<DomainCommand, PayloadError> {
    let p: TaskRef = payload(c)?;
    Ok(DomainCommand::ScheduleTaskForToday {
        task_id: entity_id(p.task_id, c, "task_id")?,
    })
}

fn focus_project(c: &RecommendationCandidate) -> Result<DomainCommand, PayloadError> {
    let p: ProjectRef = payload(c)?;
    Ok(DomainCommand::FocusProject {
        project_id: entity_id(p.project_id, c, "project_id")?,
    })
}

fn defer_task(c: &RecommendationCandidate) -> Result<DomainCommand, PayloadError> {
    let p: Deferral = payload(c)?;
    Ok(DomainCommand::DeferTask {
        task_id: entity_id(p.task_id, c, "task_id")?,
        until: p.until,
    })
}

fn reschedule_task(c: &RecommendationCandidate) -> Result<DomainCommand, PayloadError> {
    let p: Reschedule = payload(c)?;
    Ok(DomainCommand::RescheduleTask {
        task_id: entity_id(p.task_id, c, "task_id")?,
        new_due: p.new_due,
    })
}

fn scale_back_habit(c: &RecommendationCandidate) -> Result<DomainCommand, PayloadError> {
    let p: Scaling = payload(c)?;
    Ok(DomainCommand::ChangeHabitScaling {
        habit_id: entity_id(p.habit_id, c, "habit_id")?,
        mode: p.mode,
    })
}

fn start_check_in(c: &RecommendationCandidate) -> Result<DomainCommand, PayloadError> {
    let p: CheckInStart = payload(c)?;
    Ok(DomainCommand::StartCheckIn { kind: p.kind })
}

fn request_observation(c: &RecommendationCandidate) -> Result<DomainCommand, PayloadError> {
    let p: MetricRef = payload(c)?;
    Ok(DomainCommand::RequestMetricObservation {
        metric_id: entity_id(p.metric_id, c, "metric_id")?,
    })
}
