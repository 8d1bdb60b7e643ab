//! The top-level assessment run.

use crate::orchestrator::{ModelOrchestrator, SelectionMethod, Tier2Result};
use crate::ranker;
use crate::tier1::{DeltaSimilarityAssessor, QuickAssessmentResult, QuickAssessor};
use crate::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use stride_config::{PipelineConfig, RankerConfig};
use stride_core::{
    ContextRetriever, DeltaService, PipelineContext, Provider, RecommendationCandidate,
    SignalEntry, SituationalAssessment, StateSnapshot,
};
use stride_policy::{ContractPolicyEnforcer, PolicyEnforcementResult, PolicyEnforcer};
use stride_rules::{RuleEngine, RuleEvaluationResult};
use stride_telemetry::{AgentRun, CostSummary, ModelPricing, PricingTable};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where a run stopped escalating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPoint {
    Tier0Only,
    Tier1Stop,
    Tier2Executed,
}

impl StopPoint {
    pub fn as_str(self) -> &'static str {
        match self {
            StopPoint::Tier0Only => "tier0_only",
            StopPoint::Tier1Stop => "tier1_stop",
            StopPoint::Tier2Executed => "tier2_executed",
        }
    }
}

impl std::fmt::Display for StopPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssessmentStatistics {
    pub rules_evaluated: usize,
    pub rules_triggered: usize,
    pub rules_failed: usize,
    pub direct_candidates: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier1_score: Option<f64>,
    pub tier2_calls: usize,
    pub tier2_failed_calls: usize,
    pub policy_rejections: usize,
    pub policy_violations: usize,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub duration_ms: u64,
}

/// The terminal record of one run, handed to the caller for persistence.
#[derive(Debug, Clone, Serialize)]
pub struct TieredAssessmentOutcome {
    pub id: String,
    pub user_id: String,
    pub batch_id: String,
    pub processed_signal_ids: Vec<String>,
    pub tier0: RuleEvaluationResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier1: Option<QuickAssessmentResult>,
    pub tier2_executed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier2_method: Option<SelectionMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<SituationalAssessment>,
    pub stop_point: StopPoint,
    /// Approved recommendations, in output order.
    pub generated_recommendations: Vec<RecommendationCandidate>,
    pub policy: PolicyEnforcementResult,
    pub statistics: AssessmentStatistics,
    pub agent_runs: Vec<AgentRun>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Accumulated state of a run on its way to an exit point.
struct RunState {
    context: PipelineContext,
    started_at: DateTime<Utc>,
    started: Instant,
    tier0: RuleEvaluationResult,
    tier1: Option<QuickAssessmentResult>,
    tier2: Option<Tier2Result>,
}

/// Sequences Tier 0, Tier 1 and Tier 2 for one batch.
pub struct TieredAssessmentEngine {
    rules: RuleEngine,
    quick: Arc<dyn QuickAssessor>,
    orchestrator: Option<Arc<ModelOrchestrator>>,
    policy: Arc<dyn PolicyEnforcer>,
    delta: Arc<dyn DeltaService>,
    max_results: usize,
}

impl TieredAssessmentEngine {
    /// An engine without a model stage; escalations stop at Tier 1.
    pub fn new(
        rules: RuleEngine,
        quick: Arc<dyn QuickAssessor>,
        policy: Arc<dyn PolicyEnforcer>,
        delta: Arc<dyn DeltaService>,
    ) -> Self {
        Self {
            rules,
            quick,
            orchestrator: None,
            policy,
            delta,
            max_results: RankerConfig::default().max_results,
        }
    }

    pub fn with_orchestrator(mut self, orchestrator: ModelOrchestrator) -> Self {
        self.orchestrator = Some(Arc::new(orchestrator));
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    /// Wire every tier from configuration. Without a provider, or with
    /// `tier2.enabled = false`, runs never go past Tier 1.
    pub fn from_config(
        config: &PipelineConfig,
        provider: Option<Arc<dyn Provider>>,
        delta: Arc<dyn DeltaService>,
        retriever: Arc<dyn ContextRetriever>,
    ) -> stride_core::Result<Self> {
        let rules = RuleEngine::from_config(&config.rules)?;
        let quick = DeltaSimilarityAssessor::new(
            Arc::clone(&delta),
            Arc::clone(&retriever),
            config.tier1.clone(),
        );
        let policy = ContractPolicyEnforcer::from_config(&config.policy)?;

        let mut engine = Self::new(rules, Arc::new(quick), Arc::new(policy), delta)
            .with_max_results(config.ranker.max_results);

        match provider {
            Some(provider) if config.tier2.enabled => {
                let pricing = PricingTable::with_defaults();
                for (model, p) in &config.telemetry.custom_pricing {
                    let mut pricing_entry = ModelPricing::new(p.input_per_m, p.output_per_m);
                    if let Some(cached) = p.cached_per_m {
                        pricing_entry = pricing_entry.with_cached(cached);
                    }
                    pricing.set(model.clone(), pricing_entry);
                }
                engine = engine.with_orchestrator(
                    ModelOrchestrator::new(provider, retriever, &config.tier2)
                        .with_pricing(Arc::new(pricing)),
                );
            }
            Some(_) => info!("Tier 2 disabled by configuration"),
            None => info!("No model provider; Tier 2 unavailable"),
        }
        Ok(engine)
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn has_model_stage(&self) -> bool {
        self.orchestrator.is_some()
    }

    /// Assess one batch of signals against one snapshot.
    ///
    /// Only cancellation is an error; rule failures, collaborator failures
    /// and Tier 2 failures all degrade to the best result available.
    pub async fn assess(
        &self,
        state: Arc<StateSnapshot>,
        signals: Arc<[SignalEntry]>,
        batch_id: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<TieredAssessmentOutcome, EngineError> {
        let started_at = Utc::now();
        let started = Instant::now();
        let context = PipelineContext::new(state.user_id.clone(), batch_id);
        info!(
            user = %context.user_id,
            batch = %context.batch_id,
            signals = signals.len(),
            rules = self.rules.len(),
            "Assessment started"
        );

        // Rule evaluation fails only on cancellation.
        let tier0 = self
            .rules
            .evaluate(Arc::clone(&state), Arc::clone(&signals), cancel)
            .await
            .map_err(|_| EngineError::Cancelled)?;

        let mut run = RunState {
            context,
            started_at,
            started,
            tier0,
            tier1: None,
            tier2: None,
        };
        run.context.triggered_rule_ids = run.tier0.triggered_ids();

        if !run.tier0.should_escalate_to_tier1 {
            let ranked = self.rank_direct(&run.tier0, &state);
            return Ok(self.finish(run, StopPoint::Tier0Only, ranked, &state, &signals));
        }

        info!(reason = %run.tier0.escalation_reason, tier = 1, "Escalating");
        let tier1 = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            result = self.quick.assess(&state, &signals, &run.tier0) => result,
        };
        run.context.tier1_context = tier1.rendered_context();
        let escalate = tier1.should_escalate_to_tier2;
        run.tier1 = Some(tier1);

        if !escalate {
            let ranked = self.rank_direct(&run.tier0, &state);
            return Ok(self.finish(run, StopPoint::Tier1Stop, ranked, &state, &signals));
        }
        if run.tier0.direct_recommendations.is_empty() {
            info!("Tier 2 skipped: no candidates to select from");
            return Ok(self.finish(run, StopPoint::Tier1Stop, Vec::new(), &state, &signals));
        }
        let Some(orchestrator) = self.orchestrator.clone() else {
            info!("Tier 2 skipped: no model stage configured");
            let ranked = self.rank_direct(&run.tier0, &state);
            return Ok(self.finish(run, StopPoint::Tier1Stop, ranked, &state, &signals));
        };

        info!(
            score = run.tier1.as_ref().map(|t| t.combined_score),
            tier = 2,
            "Escalating"
        );

        // Spawned so a panic inside the model stage is contained. The set
        // aborts the task if this future is dropped.
        let mut tier2_task = JoinSet::new();
        {
            let state = Arc::clone(&state);
            let candidates = run.tier0.direct_recommendations.clone();
            let context = run.context.clone();
            let cancel = cancel.clone();
            tier2_task.spawn(async move {
                orchestrator.run(&state, &candidates, &context, &cancel).await
            });
        }
        let joined = tier2_task.join_next().await;

        let recommendations = match joined {
            Some(Ok(Ok(result))) => {
                let recommendations = if result.method == SelectionMethod::ModelSelected {
                    if let Err(e) = self.delta.record_baseline(&state.user_id, &state).await {
                        warn!(user = %state.user_id, error = %e, "Baseline write failed");
                    }
                    result.candidates.clone()
                } else {
                    warn!("Tier 2 failed; falling back to rule recommendations");
                    self.rank_direct(&run.tier0, &state)
                };
                run.tier2 = Some(result);
                recommendations
            }
            Some(Ok(Err(EngineError::Cancelled))) => return Err(EngineError::Cancelled),
            Some(Err(e)) => {
                warn!(error = %e, "Tier 2 task aborted; falling back to rule recommendations");
                run.tier2 = Some(Tier2Result::failed(None, Vec::new()));
                self.rank_direct(&run.tier0, &state)
            }
            None => {
                warn!("Tier 2 task missing; falling back to rule recommendations");
                run.tier2 = Some(Tier2Result::failed(None, Vec::new()));
                self.rank_direct(&run.tier0, &state)
            }
        };

        Ok(self.finish(run, StopPoint::Tier2Executed, recommendations, &state, &signals))
    }

    fn rank_direct(
        &self,
        tier0: &RuleEvaluationResult,
        state: &StateSnapshot,
    ) -> Vec<RecommendationCandidate> {
        ranker::rank(tier0.direct_recommendations.clone(), state, self.max_results)
    }

    /// Apply policy and assemble the outcome.
    fn finish(
        &self,
        mut run: RunState,
        stop_point: StopPoint,
        recommendations: Vec<RecommendationCandidate>,
        state: &StateSnapshot,
        signals: &[SignalEntry],
    ) -> TieredAssessmentOutcome {
        run.context.tier = Some(stop_point.as_str().to_string());
        let policy = self.policy.enforce(recommendations, state, &run.context);
        if policy.had_adjustments() {
            debug!(
                rejected = policy.rejected_count(),
                violations = policy.violations.len(),
                "Policy adjusted recommendations"
            );
        }

        let (tier2_method, assessment, agent_runs) = match run.tier2 {
            Some(result) => (Some(result.method), result.assessment, result.agent_runs),
            None => (None, None, Vec::new()),
        };
        let cost = CostSummary::from_runs(&agent_runs);

        let statistics = AssessmentStatistics {
            rules_evaluated: run.tier0.all_results.len(),
            rules_triggered: run.tier0.triggered_rules.len(),
            rules_failed: run.tier0.failed_rules().count(),
            direct_candidates: run.tier0.direct_recommendations.len(),
            tier1_score: run.tier1.as_ref().map(|t| t.combined_score),
            tier2_calls: agent_runs.len(),
            tier2_failed_calls: cost.failed_calls as usize,
            policy_rejections: policy.rejected_count(),
            policy_violations: policy.violations.len(),
            total_tokens: cost.total_tokens(),
            total_cost_usd: cost.total_cost_usd,
            duration_ms: run.started.elapsed().as_millis() as u64,
        };

        info!(
            user = %run.context.user_id,
            batch = %run.context.batch_id,
            tier = %stop_point,
            approved = policy.approved.len(),
            rejected = statistics.policy_rejections,
            duration_ms = statistics.duration_ms,
            "Assessment complete"
        );

        TieredAssessmentOutcome {
            id: Uuid::new_v4().to_string(),
            user_id: run.context.user_id,
            batch_id: run.context.batch_id,
            processed_signal_ids: signals.iter().map(|s| s.id.clone()).collect(),
            tier0: run.tier0,
            tier1: run.tier1,
            tier2_executed: stop_point == StopPoint::Tier2Executed,
            tier2_method,
            assessment,
            stop_point,
            generated_recommendations: policy.approved.clone(),
            policy,
            statistics,
            agent_runs,
            started_at: run.started_at,
            completed_at: Utc::now(),
        }
    }
}
