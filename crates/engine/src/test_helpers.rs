//! Shared test helpers for engine tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use stride_core::error::{CollaboratorError, CommandError, ProviderError};
use stride_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use stride_core::{
    ActionKind, CommandBus, CommandOutcome, DeltaService, DomainCommand, RecommendationCandidate,
    Severity, SignalEntry, StateSnapshot, TargetKind,
};
use stride_rules::{RuleEvaluationResult, RuleResult, escalation};

/// A mock provider that returns a sequence of scripted results.
///
/// Each call to `complete` returns the next result in the queue, after an
/// optional delay. Panics if more calls are made than results provided.
pub struct ScriptedProvider {
    results: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(results: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            results: Mutex::new(results),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let next = {
            let mut requests = self.requests.lock().unwrap();
            let call = requests.len();
            requests.push(request);
            let results = self.results.lock().unwrap();
            if call >= results.len() {
                panic!(
                    "ScriptedProvider: no more results (call #{}, have {})",
                    call,
                    results.len()
                );
            }
            results[call].clone()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next
    }
}

/// A response with fixed token usage.
pub fn response(content: &str) -> ProviderResponse {
    ProviderResponse {
        content: content.into(),
        usage: Some(Usage {
            prompt_tokens: 120,
            completion_tokens: 40,
            total_tokens: 160,
            cached_tokens: 0,
            reasoning_tokens: 0,
        }),
        model: "mock-model".into(),
        response_id: Some("resp_1".into()),
    }
}

pub fn assessment_json() -> String {
    serde_json::json!({
        "summary": "Busy week with a slipping habit",
        "key_concerns": ["deadline"],
        "opportunities": ["free evening"],
        "user_state": "stretched",
        "urgency": "medium",
    })
    .to_string()
}

/// Task candidates `t0..tn` with the given scores.
pub fn candidates(scores: &[f64]) -> Vec<RecommendationCandidate> {
    scores
        .iter()
        .enumerate()
        .map(|(i, score)| {
            RecommendationCandidate::new(ActionKind::ExecuteToday, TargetKind::Task, format!("Task {i}"))
                .with_target(format!("t{i}"), format!("Task {i}"))
                .with_rationale(format!("Rule rationale {i}"))
                .with_score(*score)
                .from_rule(format!("rule_{i}"))
        })
        .collect()
}

/// A Tier 0 result with one triggered rule per severity, each carrying a
/// task recommendation.
pub fn tier0_with(severities: &[Severity]) -> RuleEvaluationResult {
    let triggered: Vec<RuleResult> = severities
        .iter()
        .enumerate()
        .map(|(i, severity)| {
            let title = if i == 0 {
                "Finish the quarterly report".to_string()
            } else {
                format!("Task {i}")
            };
            let candidate = RecommendationCandidate::new(ActionKind::ExecuteToday, TargetKind::Task, title)
                .with_target(format!("t{i}"), format!("Task {i}"))
                .with_score(0.5)
                .from_rule(format!("rule_{i}"));
            RuleResult::triggered(format!("rule_{i}"), *severity).with_recommendation(candidate)
        })
        .collect();
    let direct: Vec<RecommendationCandidate> = triggered
        .iter()
        .filter_map(|r| r.direct_recommendation.clone())
        .collect();
    let reason = escalation::decide(&triggered, &direct);
    RuleEvaluationResult {
        all_results: triggered.clone(),
        triggered_rules: triggered,
        direct_recommendations: direct,
        should_escalate_to_tier1: reason.escalates(),
        escalation_reason: reason,
    }
}

pub struct FixedDelta(pub f64);

#[async_trait]
impl DeltaService for FixedDelta {
    async fn calculate_delta(
        &self,
        _user_id: &str,
        _state: &StateSnapshot,
        _signals: &[SignalEntry],
    ) -> Result<f64, CollaboratorError> {
        Ok(self.0)
    }

    async fn record_baseline(&self, _user_id: &str, _state: &StateSnapshot) -> Result<(), CollaboratorError> {
        Ok(())
    }
}

pub struct FailingDelta;

#[async_trait]
impl DeltaService for FailingDelta {
    async fn calculate_delta(
        &self,
        _user_id: &str,
        _state: &StateSnapshot,
        _signals: &[SignalEntry],
    ) -> Result<f64, CollaboratorError> {
        Err(CollaboratorError::Unavailable {
            service: "delta".into(),
            reason: "store offline".into(),
        })
    }

    async fn record_baseline(&self, _user_id: &str, _state: &StateSnapshot) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::Unavailable {
            service: "delta".into(),
            reason: "store offline".into(),
        })
    }
}

/// Command bus that records every command and answers with the command's
/// target id. `reject` makes every send fail.
#[derive(Default)]
pub struct RecordingBus {
    pub sent: Mutex<Vec<DomainCommand>>,
    pub reject: bool,
}

impl RecordingBus {
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<DomainCommand> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandBus for RecordingBus {
    async fn send(&self, command: DomainCommand) -> Result<CommandOutcome, CommandError> {
        if self.reject {
            return Err(CommandError::Rejected {
                reason: "bus closed".into(),
            });
        }
        let entity_id = match &command {
            DomainCommand::CreateTask { .. } => Some("new-task".to_string()),
            DomainCommand::ScheduleTaskForToday { task_id }
            | DomainCommand::DeferTask { task_id, .. }
            | DomainCommand::RescheduleTask { task_id, .. } => Some(task_id.clone()),
            DomainCommand::ChangeHabitScaling { habit_id, .. } => Some(habit_id.clone()),
            DomainCommand::StartCheckIn { .. } => Some("new-check-in".to_string()),
            DomainCommand::RequestMetricObservation { metric_id } => Some(metric_id.clone()),
            DomainCommand::FocusProject { project_id } => Some(project_id.clone()),
        };
        self.sent.lock().unwrap().push(command);
        Ok(CommandOutcome { entity_id })
    }
}
