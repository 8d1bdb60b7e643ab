//! Model-call records and their aggregated cost views.

use crate::pricing::PricingTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use stride_core::error::ProviderError;
use stride_core::{ProviderResponse, Usage};
use uuid::Uuid;

// ── Stage ─────────────────────────────────────────────────────────────────

/// Which Tier 2 stage issued a model call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AgentStage {
    SituationalAssessment,
    CandidateSelection,
}

impl std::fmt::Display for AgentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SituationalAssessment => write!(f, "situational_assessment"),
            Self::CandidateSelection => write!(f, "candidate_selection"),
        }
    }
}

// ── AgentRun ──────────────────────────────────────────────────────────────

/// One external model call. Immutable once built by [`CallRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: String,
    pub stage: AgentStage,
    /// Model requested (or the one that answered, when reported).
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cached_tokens: u32,
    pub reasoning_tokens: u32,
    pub latency_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub success: bool,
    /// Machine-readable failure class (`timeout`, `invalid_response`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    /// Estimated cost in USD.
    pub cost_usd: f64,
}

impl AgentRun {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

// ── CallRecord ────────────────────────────────────────────────────────────

/// In-flight instrumentation for one model call.
///
/// Every path out of a stage call ends in [`CallRecord::succeed`] or
/// [`CallRecord::fail`], so a record exists whether or not the call worked.
#[derive(Debug)]
pub struct CallRecord {
    stage: AgentStage,
    model: String,
    started_at: DateTime<Utc>,
    started: Instant,
    usage: Usage,
    response_id: Option<String>,
}

impl CallRecord {
    pub fn start(stage: AgentStage, model: impl Into<String>) -> Self {
        Self {
            stage,
            model: model.into(),
            started_at: Utc::now(),
            started: Instant::now(),
            usage: Usage::default(),
            response_id: None,
        }
    }

    /// Capture token usage and identifiers from a transport response.
    ///
    /// Call this before deciding whether the content is usable: a malformed
    /// reply still consumed tokens.
    pub fn record_response(&mut self, response: &ProviderResponse) {
        if let Some(usage) = &response.usage {
            self.usage = usage.clone();
        }
        if !response.model.is_empty() {
            self.model = response.model.clone();
        }
        self.response_id = response.response_id.clone();
    }

    pub fn succeed(self, pricing: &PricingTable) -> AgentRun {
        self.finish(None, pricing)
    }

    pub fn fail(self, error: &ProviderError, pricing: &PricingTable) -> AgentRun {
        self.finish(Some(error), pricing)
    }

    fn finish(self, error: Option<&ProviderError>, pricing: &PricingTable) -> AgentRun {
        let latency_ms = self.started.elapsed().as_millis() as u64;
        let cost_usd = pricing.compute_cost(
            &self.model,
            self.usage.prompt_tokens,
            self.usage.cached_tokens,
            self.usage.completion_tokens,
        );
        AgentRun {
            id: Uuid::new_v4().to_string(),
            stage: self.stage,
            model: self.model,
            input_tokens: self.usage.prompt_tokens,
            output_tokens: self.usage.completion_tokens,
            cached_tokens: self.usage.cached_tokens,
            reasoning_tokens: self.usage.reasoning_tokens,
            latency_ms,
            started_at: self.started_at,
            completed_at: Utc::now(),
            success: error.is_none(),
            error_kind: error.map(|e| e.kind().to_string()),
            error_message: error.map(|e| e.to_string()),
            response_id: self.response_id,
            cost_usd,
        }
    }
}

// ── Aggregated views ──────────────────────────────────────────────────────

/// Aggregated cost of a set of model calls.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CostSummary {
    pub total_cost_usd: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub calls: u64,
    pub failed_calls: u64,
    /// Cost breakdown by model, sorted by model name.
    pub by_model: Vec<ModelCost>,
}

/// Cost breakdown for a single model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelCost {
    pub model: String,
    pub cost_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub calls: u64,
}

impl CostSummary {
    pub fn from_runs(runs: &[AgentRun]) -> Self {
        let mut summary = CostSummary::default();
        for run in runs {
            summary.total_cost_usd += run.cost_usd;
            summary.total_input_tokens += u64::from(run.input_tokens);
            summary.total_output_tokens += u64::from(run.output_tokens);
            summary.calls += 1;
            if !run.success {
                summary.failed_calls += 1;
            }

            match summary.by_model.iter_mut().find(|m| m.model == run.model) {
                Some(entry) => {
                    entry.cost_usd += run.cost_usd;
                    entry.input_tokens += u64::from(run.input_tokens);
                    entry.output_tokens += u64::from(run.output_tokens);
                    entry.calls += 1;
                }
                None => summary.by_model.push(ModelCost {
                    model: run.model.clone(),
                    cost_usd: run.cost_usd,
                    input_tokens: u64::from(run.input_tokens),
                    output_tokens: u64::from(run.output_tokens),
                    calls: 1,
                }),
            }
        }
        summary.by_model.sort_by(|a, b| a.model.cmp(&b.model));
        summary
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens + self.total_output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(model: &str, prompt: u32, completion: u32) -> ProviderResponse {
        ProviderResponse {
            content: "{}".into(),
            usage: Some(Usage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
                cached_tokens: 0,
                reasoning_tokens: 0,
            }),
            model: model.into(),
            response_id: Some("resp-1".into()),
        }
    }

    #[test]
    fn successful_call_records_tokens_and_cost() {
        let pricing = PricingTable::with_defaults();
        let mut record = CallRecord::start(AgentStage::SituationalAssessment, "gpt-4o-mini");
        record.record_response(&response("gpt-4o-mini", 1_000_000, 0));
        let run = record.succeed(&pricing);

        assert!(run.success);
        assert_eq!(run.input_tokens, 1_000_000);
        assert_eq!(run.response_id.as_deref(), Some("resp-1"));
        assert!((run.cost_usd - 0.15).abs() < 1e-9);
        assert!(run.error_kind.is_none());
        assert!(run.completed_at >= run.started_at);
    }

    #[test]
    fn failed_call_without_response_still_records() {
        let pricing = PricingTable::with_defaults();
        let record = CallRecord::start(AgentStage::CandidateSelection, "gpt-4o");
        let run = record.fail(&ProviderError::Timeout("45s".into()), &pricing);

        assert!(!run.success);
        assert_eq!(run.error_kind.as_deref(), Some("timeout"));
        assert!(run.error_message.as_ref().unwrap().contains("45s"));
        assert_eq!(run.total_tokens(), 0);
        assert_eq!(run.cost_usd, 0.0);
    }

    #[test]
    fn malformed_reply_keeps_usage() {
        let pricing = PricingTable::with_defaults();
        let mut record = CallRecord::start(AgentStage::CandidateSelection, "gpt-4o");
        record.record_response(&response("gpt-4o", 300, 40));
        let run = record.fail(&ProviderError::InvalidResponse("not json".into()), &pricing);
        assert_eq!(run.error_kind.as_deref(), Some("invalid_response"));
        assert_eq!(run.total_tokens(), 340);
        assert!(run.cost_usd > 0.0);
    }

    #[test]
    fn summary_groups_by_model() {
        let pricing = PricingTable::with_defaults();
        let mut a = CallRecord::start(AgentStage::SituationalAssessment, "gpt-4o");
        a.record_response(&response("gpt-4o", 100, 50));
        let mut b = CallRecord::start(AgentStage::CandidateSelection, "gpt-4o-mini");
        b.record_response(&response("gpt-4o-mini", 200, 20));
        let c = CallRecord::start(AgentStage::CandidateSelection, "gpt-4o");

        let runs = vec![
            a.succeed(&pricing),
            b.succeed(&pricing),
            c.fail(&ProviderError::EmptyContent, &pricing),
        ];
        let summary = CostSummary::from_runs(&runs);

        assert_eq!(summary.calls, 3);
        assert_eq!(summary.failed_calls, 1);
        assert_eq!(summary.total_tokens(), 370);
        assert_eq!(summary.by_model.len(), 2);
        assert_eq!(summary.by_model[0].model, "gpt-4o");
        assert_eq!(summary.by_model[0].calls, 2);
    }

    #[test]
    fn stage_display() {
        assert_eq!(
            AgentStage::SituationalAssessment.to_string(),
            "situational_assessment"
        );
        assert_eq!(AgentStage::CandidateSelection.to_string(), "candidate_selection");
    }
}
