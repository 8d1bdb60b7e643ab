//! Tier 2: two schema-constrained model calls.
//!
//! 1. **Situational assessment**: state, rule ids and retrieved context in,
//!    a [`SituationalAssessment`] out.
//! 2. **Candidate selection**: the assessment and the indexed Tier 0
//!    candidates in, a ranked subset with personal rationales out.
//!
//! Each call is timed out on its own, attempted once, and always leaves an
//! [`AgentRun`]. Any stage failure ends the run with
//! [`SelectionMethod::Failed`] and no candidates; only cancellation is an
//! error.

use crate::EngineError;
use crate::prompts;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use stride_config::Tier2Config;
use stride_core::error::ProviderError;
use stride_core::{
    ContextBundle, ContextRetriever, Message, PipelineContext, Provider, ProviderRequest,
    RecommendationCandidate, ResponseFormat, SituationalAssessment, StateSnapshot,
};
use stride_telemetry::{AgentRun, AgentStage, CallRecord, PricingTable};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Score added per rank step above the lowest selected rank.
const RANK_BOOST: f64 = 0.01;

/// How the Tier 2 candidate list was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    ModelSelected,
    Failed,
}

/// Everything one Tier 2 run produced.
#[derive(Debug, Clone, Serialize)]
pub struct Tier2Result {
    pub method: SelectionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment: Option<SituationalAssessment>,
    /// Selected candidates, best rank first.
    pub candidates: Vec<RecommendationCandidate>,
    /// Selections dropped for a bad index or rank.
    pub discarded_selections: usize,
    pub agent_runs: Vec<AgentRun>,
}

impl Tier2Result {
    pub(crate) fn failed(assessment: Option<SituationalAssessment>, agent_runs: Vec<AgentRun>) -> Self {
        Self {
            method: SelectionMethod::Failed,
            assessment,
            candidates: Vec::new(),
            discarded_selections: 0,
            agent_runs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SelectionResponse {
    selections: Vec<Selection>,
}

#[derive(Debug, Clone, Deserialize)]
struct Selection {
    index: usize,
    rank: u32,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    action_summary: String,
}

/// Runs the assessment and selection stages against one provider.
pub struct ModelOrchestrator {
    provider: Arc<dyn Provider>,
    retriever: Arc<dyn ContextRetriever>,
    pricing: Arc<PricingTable>,
    assessment_model: String,
    selection_model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl ModelOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        retriever: Arc<dyn ContextRetriever>,
        config: &Tier2Config,
    ) -> Self {
        Self {
            provider,
            retriever,
            pricing: Arc::new(PricingTable::with_defaults()),
            assessment_model: config.assessment_model.clone(),
            selection_model: config.selection_model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn with_pricing(mut self, pricing: Arc<PricingTable>) -> Self {
        self.pricing = pricing;
        self
    }

    /// Per-stage timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run both stages over `candidates`.
    pub async fn run(
        &self,
        state: &StateSnapshot,
        candidates: &[RecommendationCandidate],
        context: &PipelineContext,
        cancel: &CancellationToken,
    ) -> Result<Tier2Result, EngineError> {
        let mut runs = Vec::with_capacity(2);

        info!(
            provider = self.provider.name(),
            model = %self.assessment_model,
            candidates = candidates.len(),
            "Tier 2: assessing situation"
        );
        let retrieved = cancellable(cancel, self.retriever.retrieve_for_assessment(state, context))
            .await?
            .unwrap_or_else(|e| {
                warn!(error = %e, "Assessment context retrieval failed");
                ContextBundle::default()
            });
        let (run, assessment) = self
            .call_stage::<SituationalAssessment>(
                AgentStage::SituationalAssessment,
                &self.assessment_model,
                prompts::ASSESSMENT_SYSTEM,
                prompts::assessment_prompt(state, context, &retrieved),
                prompts::assessment_schema(),
                cancel,
            )
            .await?;
        runs.push(run);
        let Some(assessment) = assessment else {
            return Ok(Tier2Result::failed(None, runs));
        };

        info!(
            model = %self.selection_model,
            urgency = %assessment.urgency,
            "Tier 2: selecting candidates"
        );
        let retrieved = cancellable(
            cancel,
            self.retriever
                .retrieve_for_selection(&assessment, context, &state.user_id),
        )
        .await?
        .unwrap_or_else(|e| {
            warn!(error = %e, "Selection context retrieval failed");
            ContextBundle::default()
        });
        let (run, selection) = self
            .call_stage::<SelectionResponse>(
                AgentStage::CandidateSelection,
                &self.selection_model,
                prompts::SELECTION_SYSTEM,
                prompts::selection_prompt(&assessment, candidates, &retrieved),
                prompts::selection_schema(),
                cancel,
            )
            .await?;
        runs.push(run);
        let Some(selection) = selection else {
            return Ok(Tier2Result::failed(Some(assessment), runs));
        };

        let (selected, discarded) = apply_selections(candidates, selection.selections);
        info!(
            selected = selected.len(),
            discarded,
            "Tier 2: selection complete"
        );
        Ok(Tier2Result {
            method: SelectionMethod::ModelSelected,
            assessment: Some(assessment),
            candidates: selected,
            discarded_selections: discarded,
            agent_runs: runs,
        })
    }

    /// One instrumented, timed-out model call.
    ///
    /// Returns the call record and the parsed value, or `None` on any
    /// transport or shape failure.
    async fn call_stage<T: DeserializeOwned>(
        &self,
        stage: AgentStage,
        model: &str,
        system: &str,
        user: String,
        schema: serde_json::Value,
        cancel: &CancellationToken,
    ) -> Result<(AgentRun, Option<T>), EngineError> {
        let mut record = CallRecord::start(stage, model);
        let request = ProviderRequest {
            model: model.to_string(),
            messages: vec![Message::system(system), Message::user(user)],
            temperature: self.temperature,
            max_tokens: Some(self.max_tokens),
            response_format: Some(ResponseFormat::json_schema(stage.to_string(), schema)),
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, self.provider.complete(request)) => outcome,
        };

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Ok((self.stage_failed(record, stage, e), None)),
            Err(_) => {
                let e = ProviderError::Timeout(format!(
                    "{stage} did not answer within {}s",
                    self.timeout.as_secs_f64()
                ));
                return Ok((self.stage_failed(record, stage, e), None));
            }
        };

        record.record_response(&response);
        if response.content.trim().is_empty() {
            return Ok((self.stage_failed(record, stage, ProviderError::EmptyContent), None));
        }
        match serde_json::from_str::<T>(&response.content) {
            Ok(value) => {
                let run = record.succeed(&self.pricing);
                debug!(
                    %stage,
                    model = %run.model,
                    latency_ms = run.latency_ms,
                    tokens = run.total_tokens(),
                    "Stage call succeeded"
                );
                Ok((run, Some(value)))
            }
            Err(e) => {
                let e = ProviderError::InvalidResponse(e.to_string());
                Ok((self.stage_failed(record, stage, e), None))
            }
        }
    }

    fn stage_failed(&self, record: CallRecord, stage: AgentStage, error: ProviderError) -> AgentRun {
        let run = record.fail(&error, &self.pricing);
        warn!(
            %stage,
            model = %run.model,
            kind = error.kind(),
            latency_ms = run.latency_ms,
            "Stage call failed: {error}"
        );
        run
    }
}

/// Await `fut` unless `cancel` fires first.
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, EngineError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        output = fut => Ok(output),
    }
}

/// Turn model selections back into full candidates.
///
/// Out-of-range and repeated indices are dropped, as are ranks below 1.
/// Scores are nudged up by
/// rank so the model's ordering shows without losing the rule's confidence.
fn apply_selections(
    candidates: &[RecommendationCandidate],
    mut selections: Vec<Selection>,
) -> (Vec<RecommendationCandidate>, usize) {
    let mut discarded = 0;
    let mut seen = HashSet::new();
    selections.retain(|s| {
        if s.index >= candidates.len() {
            warn!(
                index = s.index,
                candidates = candidates.len(),
                "Selection index out of range; dropped"
            );
            discarded += 1;
            false
        } else if s.rank == 0 {
            warn!(index = s.index, "Selection rank must start at 1; dropped");
            discarded += 1;
            false
        } else if !seen.insert(s.index) {
            warn!(index = s.index, "Duplicate selection index; dropped");
            discarded += 1;
            false
        } else {
            true
        }
    });
    selections.sort_by_key(|s| (s.rank, s.index));

    let max_rank = selections.iter().map(|s| s.rank).max().unwrap_or(0);
    let selected = selections
        .into_iter()
        .map(|s| {
            let mut candidate = candidates[s.index].clone();
            let steps = f64::from(max_rank - s.rank) + 1.0;
            candidate.score = (candidate.score + steps * RANK_BOOST).min(1.0);
            if !s.rationale.trim().is_empty() {
                candidate.rationale = s.rationale;
            }
            if !s.action_summary.trim().is_empty() {
                candidate.action_summary = s.action_summary;
            }
            candidate
        })
        .collect();
    (selected, discarded)
}
