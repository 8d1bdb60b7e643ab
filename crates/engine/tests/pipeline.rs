//! End-to-end runs of the tiered pipeline with the built-in rules and a
//! scripted model provider.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stride_config::{ContractConfig, PipelineConfig, Tier2Config};
use stride_context::{InMemoryDeltaService, NoopRetriever};
use stride_core::error::{ProviderError, RuleError};
use stride_core::{
    ActionKind, Provider, ProviderRequest, ProviderResponse, RecommendationCandidate, Severity,
    SignalEntry, SignalType, StateSnapshot, TargetKind, Usage,
};
use stride_engine::{
    DeltaSimilarityAssessor, ModelOrchestrator, SelectionMethod, StopPoint, TieredAssessmentEngine,
};
use stride_policy::PassthroughEnforcer;
use stride_rules::{Rule, RuleEngine, RuleResult, default_rules};
use tokio_util::sync::CancellationToken;

// ── Scripted provider ─────────────────────────────────────────────────────

struct ScriptedProvider {
    contents: Vec<String>,
    calls: Mutex<usize>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    fn new(contents: &[&str]) -> Self {
        Self {
            contents: contents.iter().map(|c| c.to_string()).collect(),
            calls: Mutex::new(0),
            delay: None,
        }
    }

    fn slow(contents: &[&str], delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(contents)
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let content = {
            let mut calls = self.calls.lock().unwrap();
            let content = self.contents.get(*calls).cloned();
            *calls += 1;
            content
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let content = content.ok_or_else(|| ProviderError::Network("script exhausted".into()))?;
        Ok(ProviderResponse {
            content,
            usage: Some(Usage {
                prompt_tokens: 200,
                completion_tokens: 50,
                total_tokens: 250,
                ..Default::default()
            }),
            model: "mock-model".into(),
            response_id: None,
        })
    }
}

const ASSESSMENT: &str = r#"{
    "summary": "Morning with a struggling habit",
    "key_concerns": ["meditation has stalled"],
    "opportunities": ["long check-in streak"],
    "user_state": "steady",
    "urgency": "medium"
}"#;

fn selection(entries: &[(usize, u32)]) -> String {
    let selections: Vec<_> = entries
        .iter()
        .map(|(index, rank)| {
            serde_json::json!({
                "index": index,
                "rank": rank,
                "rationale": format!("Picked at rank {rank}"),
                "action_summary": "",
            })
        })
        .collect();
    serde_json::json!({ "selections": selections }).to_string()
}

// ── Fixtures ──────────────────────────────────────────────────────────────

/// A user with a 30-day check-in streak and a minimum-mode habit at 20%.
fn snapshot() -> Arc<StateSnapshot> {
    let state: StateSnapshot = serde_json::from_value(serde_json::json!({
        "user_id": "u1",
        "as_of": "2026-03-02T08:00:00Z",
        "local_date": "2026-03-02",
        "check_in_streak": 30,
        "habits": [{
            "id": "h1",
            "title": "Meditate",
            "scaling_mode": "minimum",
            "completed_last_7d": 1,
            "expected_last_7d": 5,
            "current_streak": 10
        }]
    }))
    .unwrap();
    Arc::new(state)
}

fn morning_window() -> Arc<[SignalEntry]> {
    let at = chrono::DateTime::parse_from_rfc3339("2026-03-02T07:00:00Z")
        .unwrap()
        .to_utc();
    Arc::from(vec![SignalEntry::new("sig-1", SignalType::MorningWindowStart, at)])
}

fn engine_with(provider: Arc<dyn Provider>, timeout: Duration) -> TieredAssessmentEngine {
    let delta = Arc::new(InMemoryDeltaService::new());
    let quick = DeltaSimilarityAssessor::new(delta.clone(), Arc::new(NoopRetriever), Default::default());
    TieredAssessmentEngine::new(
        RuleEngine::new(default_rules()),
        Arc::new(quick),
        Arc::new(PassthroughEnforcer),
        delta,
    )
    .with_orchestrator(
        ModelOrchestrator::new(provider, Arc::new(NoopRetriever), &Tier2Config::default())
            .with_timeout(timeout),
    )
}

struct FixedRule(&'static str, Option<Severity>);

impl Rule for FixedRule {
    fn id(&self) -> &str {
        self.0
    }

    fn description(&self) -> &str {
        "fixed outcome"
    }

    fn evaluate(&self, _: &StateSnapshot, _: &[SignalEntry]) -> Result<RuleResult, RuleError> {
        let Some(severity) = self.1 else {
            return Ok(RuleResult::not_triggered(self.0));
        };
        let target = format!("task-{}", self.0);
        Ok(RuleResult::triggered(self.0, severity).with_recommendation(
            RecommendationCandidate::new(ActionKind::ExecuteToday, TargetKind::Task, self.0)
                .with_target(target.clone(), target)
                .with_score(0.5)
                .from_rule(self.0),
        ))
    }
}

struct ExplodingRule(&'static str);

impl Rule for ExplodingRule {
    fn id(&self) -> &str {
        self.0
    }

    fn description(&self) -> &str {
        "always fails"
    }

    fn evaluate(&self, _: &StateSnapshot, _: &[SignalEntry]) -> Result<RuleResult, RuleError> {
        if self.0.ends_with("panic") {
            panic!("rule blew up");
        }
        Err(RuleError::Evaluation {
            rule_id: self.0.into(),
            reason: "bad data".into(),
        })
    }
}

fn offline_engine(rules: Vec<Arc<dyn Rule>>) -> TieredAssessmentEngine {
    let delta = Arc::new(InMemoryDeltaService::new());
    let quick = DeltaSimilarityAssessor::new(delta.clone(), Arc::new(NoopRetriever), Default::default());
    TieredAssessmentEngine::new(
        RuleEngine::new(rules),
        Arc::new(quick),
        Arc::new(PassthroughEnforcer),
        delta,
    )
}

// ── Scenarios ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_run_reaches_tier2_and_uses_model_order() {
    let provider = Arc::new(ScriptedProvider::new(&[ASSESSMENT, &selection(&[(1, 1), (0, 2)])]));
    let engine = engine_with(provider, Duration::from_secs(5));

    let outcome = engine
        .assess(snapshot(), morning_window(), "batch-1", &CancellationToken::new())
        .await
        .unwrap();

    // Check-in (High) and habit (High) push Tier 0 over; no baseline pushes Tier 1 over.
    assert!(outcome.tier0.should_escalate_to_tier1);
    assert!(outcome.tier1.as_ref().unwrap().should_escalate_to_tier2);
    assert_eq!(outcome.stop_point, StopPoint::Tier2Executed);
    assert_eq!(outcome.tier2_method, Some(SelectionMethod::ModelSelected));

    let recs = &outcome.generated_recommendations;
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].target_kind, TargetKind::Habit);
    assert!((recs[0].score - 0.80).abs() < 1e-9);
    assert_eq!(recs[0].rationale, "Picked at rank 1");
    assert_eq!(recs[1].action_kind, ActionKind::CheckIn);
    assert!((recs[1].score - 0.91).abs() < 1e-9);

    assert_eq!(outcome.agent_runs.len(), 2);
    assert_eq!(outcome.statistics.tier2_calls, 2);
    assert_eq!(outcome.statistics.total_tokens, 500);
    assert_eq!(outcome.processed_signal_ids, vec!["sig-1".to_string()]);
    assert!(outcome.completed_at >= outcome.started_at);
}

#[tokio::test]
async fn minimum_mode_habit_is_at_least_high() {
    let engine = offline_engine(default_rules());
    let outcome = engine
        .assess(snapshot(), Arc::from(Vec::new()), "batch-1", &CancellationToken::new())
        .await
        .unwrap();

    let habit = outcome
        .tier0
        .triggered_rules
        .iter()
        .find(|r| r.rule_id == "habit_adherence")
        .unwrap();
    assert!(habit.severity >= Severity::High);
}

#[tokio::test]
async fn thirty_day_streak_check_in_scores_ninety() {
    let engine = offline_engine(default_rules());
    let outcome = engine
        .assess(snapshot(), morning_window(), "batch-1", &CancellationToken::new())
        .await
        .unwrap();

    let check_in = outcome
        .tier0
        .direct_recommendations
        .iter()
        .find(|c| c.action_kind == ActionKind::CheckIn)
        .unwrap();
    assert!((check_in.score - 0.90).abs() < 1e-9);
    assert_eq!(check_in.contributing_signal_ids, vec!["sig-1".to_string()]);
}

#[tokio::test]
async fn tier2_timeout_falls_back_to_rule_recommendations() {
    let provider = Arc::new(ScriptedProvider::slow(&[ASSESSMENT], Duration::from_secs(5)));
    let engine = engine_with(provider, Duration::from_millis(50));

    let outcome = engine
        .assess(snapshot(), morning_window(), "batch-1", &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.tier2_executed);
    assert_eq!(outcome.tier2_method, Some(SelectionMethod::Failed));
    assert_eq!(outcome.agent_runs.len(), 1);
    assert_eq!(outcome.agent_runs[0].error_kind.as_deref(), Some("timeout"));

    let expected: Vec<RecommendationCandidate> =
        stride_engine::rank(outcome.tier0.direct_recommendations.clone(), &snapshot(), 5);
    assert_eq!(outcome.generated_recommendations, expected);
    assert_eq!(outcome.generated_recommendations.len(), 2);
}

#[tokio::test]
async fn out_of_range_selection_never_surfaces() {
    let provider = Arc::new(ScriptedProvider::new(&[ASSESSMENT, &selection(&[(7, 1), (0, 2)])]));
    let engine = engine_with(provider, Duration::from_secs(5));

    let outcome = engine
        .assess(snapshot(), morning_window(), "batch-1", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.generated_recommendations.len(), 1);
    assert_eq!(outcome.generated_recommendations[0].action_kind, ActionKind::CheckIn);
}

#[tokio::test]
async fn identical_input_gives_identical_recommendations() {
    let mut runs = Vec::new();
    for _ in 0..2 {
        let provider = Arc::new(ScriptedProvider::new(&[ASSESSMENT, &selection(&[(0, 1), (1, 2)])]));
        let engine = engine_with(provider, Duration::from_secs(5));
        let outcome = engine
            .assess(snapshot(), morning_window(), "batch-1", &CancellationToken::new())
            .await
            .unwrap();
        runs.push(outcome);
    }
    assert_eq!(runs[0].generated_recommendations, runs[1].generated_recommendations);
    assert_ne!(runs[0].id, runs[1].id);
}

#[tokio::test]
async fn one_high_one_low_stays_at_tier0() {
    let engine = offline_engine(vec![
        Arc::new(FixedRule("r1", Some(Severity::High))),
        Arc::new(FixedRule("r2", Some(Severity::Low))),
        Arc::new(FixedRule("r3", None)),
        Arc::new(FixedRule("r4", None)),
        Arc::new(FixedRule("r5", None)),
    ]);
    let outcome = engine
        .assess(snapshot(), Arc::from(Vec::new()), "b", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.tier0.all_results.len(), 5);
    assert_eq!(outcome.tier0.triggered_rules.len(), 2);
    assert!(!outcome.tier0.should_escalate_to_tier1);
    assert_eq!(outcome.stop_point, StopPoint::Tier0Only);
}

#[tokio::test]
async fn two_high_escalates_past_tier0() {
    let engine = offline_engine(vec![
        Arc::new(FixedRule("r1", Some(Severity::High))),
        Arc::new(FixedRule("r2", Some(Severity::High))),
        Arc::new(FixedRule("r3", Some(Severity::Low))),
        Arc::new(FixedRule("r4", None)),
        Arc::new(FixedRule("r5", None)),
    ]);
    let outcome = engine
        .assess(snapshot(), Arc::from(Vec::new()), "b", &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.tier0.should_escalate_to_tier1);
    assert!(outcome.tier1.is_some());
    assert_ne!(outcome.stop_point, StopPoint::Tier0Only);
}

#[tokio::test]
async fn every_rule_failing_still_completes() {
    let engine = offline_engine(vec![
        Arc::new(ExplodingRule("bad_data")),
        Arc::new(ExplodingRule("bad_panic")),
        Arc::new(ExplodingRule("worse_data")),
    ]);
    let outcome = engine
        .assess(snapshot(), morning_window(), "b", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.tier0.all_results.len(), 3);
    assert!(outcome.tier0.triggered_rules.is_empty());
    assert_eq!(outcome.statistics.rules_failed, 3);
    assert!(outcome.generated_recommendations.is_empty());
    assert_eq!(outcome.stop_point, StopPoint::Tier0Only);
}

#[tokio::test]
async fn configured_contract_rejects_reflection() {
    let mut config = PipelineConfig::default();
    config.policy.contracts.push(ContractConfig {
        name: "no-reflection-prompts".into(),
        description: String::new(),
        trigger: "action:reflect".into(),
        condition: String::new(),
        action: "deny".into(),
        message: "Reflection prompts are paused".into(),
        enabled: true,
        priority: 0,
        score_cap: None,
    });
    let engine = TieredAssessmentEngine::from_config(
        &config,
        None,
        Arc::new(InMemoryDeltaService::new()),
        Arc::new(NoopRetriever),
    )
    .unwrap();
    assert!(!engine.has_model_stage());

    let outcome = engine
        .assess(snapshot(), morning_window(), "b", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.stop_point, StopPoint::Tier1Stop);
    assert_eq!(outcome.generated_recommendations.len(), 1);
    assert_eq!(outcome.generated_recommendations[0].action_kind, ActionKind::CheckIn);
    assert_eq!(outcome.statistics.policy_rejections, 1);
    assert_eq!(outcome.policy.rejected[0].rule_violated, "no-reflection-prompts");
    assert_eq!(outcome.policy.rejected[0].reason, "Reflection prompts are paused");
}

#[tokio::test]
async fn cancellation_mid_tier2_is_reported() {
    let provider = Arc::new(ScriptedProvider::slow(&[ASSESSMENT], Duration::from_secs(30)));
    let engine = engine_with(provider, Duration::from_secs(60));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = engine
        .assess(snapshot(), morning_window(), "b", &cancel)
        .await;
    assert_eq!(result.unwrap_err(), stride_engine::EngineError::Cancelled);
}
