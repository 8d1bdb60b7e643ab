//! Tier 1: a cheap gate in front of the model stage.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stride_config::Tier1Config;
use stride_core::recommendation::clamp_score;
use stride_core::{
    ContextBundle, ContextRetriever, ContextSnippet, DeltaService, SignalEntry, StateSnapshot,
};
use stride_rules::RuleEvaluationResult;
use tracing::{debug, warn};

/// Output of a Tier 1 assessment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuickAssessmentResult {
    pub combined_score: f64,
    pub delta_score: f64,
    pub similarity_score: f64,
    pub pressure_score: f64,
    pub should_escalate_to_tier2: bool,
    pub escalation_reason: String,
    /// Snippets found by the similarity lookup, forwarded to Tier 2.
    #[serde(default)]
    pub relevant_context: Vec<ContextSnippet>,
}

impl QuickAssessmentResult {
    /// Relevant context as a prompt fragment, if any was found.
    pub fn rendered_context(&self) -> Option<String> {
        if self.relevant_context.is_empty() {
            return None;
        }
        let bundle = ContextBundle {
            snippets: self.relevant_context.clone(),
        };
        Some(bundle.render())
    }
}

/// Decides whether a batch is worth a Tier 2 run.
///
/// Implementations must be deterministic for identical inputs and must not
/// fail: collaborator errors degrade the score instead.
#[async_trait]
pub trait QuickAssessor: Send + Sync {
    async fn assess(
        &self,
        state: &StateSnapshot,
        signals: &[SignalEntry],
        tier0: &RuleEvaluationResult,
    ) -> QuickAssessmentResult;
}

/// Weighted blend of state delta, similarity relevance and rule pressure.
pub struct DeltaSimilarityAssessor {
    delta: Arc<dyn DeltaService>,
    retriever: Arc<dyn ContextRetriever>,
    config: Tier1Config,
}

impl DeltaSimilarityAssessor {
    pub fn new(
        delta: Arc<dyn DeltaService>,
        retriever: Arc<dyn ContextRetriever>,
        config: Tier1Config,
    ) -> Self {
        Self {
            delta,
            retriever,
            config,
        }
    }

    fn combine(&self, delta: f64, similarity: f64, pressure: f64) -> f64 {
        let c = &self.config;
        let total = c.delta_weight + c.similarity_weight + c.pressure_weight;
        if total <= 0.0 {
            return 0.0;
        }
        clamp_score(
            (c.delta_weight * delta + c.similarity_weight * similarity + c.pressure_weight * pressure)
                / total,
        )
    }
}

/// Free-text query describing what Tier 0 found.
fn similarity_query(tier0: &RuleEvaluationResult) -> String {
    let mut parts: Vec<&str> = tier0
        .direct_recommendations
        .iter()
        .map(|c| c.title.as_str())
        .collect();
    if parts.is_empty() {
        parts = tier0.triggered_rules.iter().map(|r| r.rule_id.as_str()).collect();
    }
    parts.join("; ")
}

#[async_trait]
impl QuickAssessor for DeltaSimilarityAssessor {
    async fn assess(
        &self,
        state: &StateSnapshot,
        signals: &[SignalEntry],
        tier0: &RuleEvaluationResult,
    ) -> QuickAssessmentResult {
        let delta = match self
            .delta
            .calculate_delta(&state.user_id, state, signals)
            .await
        {
            Ok(d) => clamp_score(d),
            Err(e) => {
                warn!(user = %state.user_id, error = %e, "Delta calculation failed");
                0.0
            }
        };

        let query = similarity_query(tier0);
        let (similarity, relevant_context) = if query.is_empty() {
            (0.0, Vec::new())
        } else {
            match self.retriever.find_similar(&state.user_id, &query).await {
                Ok(found) => (clamp_score(found.score), found.snippets),
                Err(e) => {
                    warn!(user = %state.user_id, error = %e, "Similarity lookup failed");
                    (0.0, Vec::new())
                }
            }
        };

        let pressure = tier0.highest_severity().map(|s| s.weight()).unwrap_or(0.0);
        let combined = self.combine(delta, similarity, pressure);
        let threshold = self.config.escalation_threshold;
        let should_escalate = combined > threshold;

        let escalation_reason = if should_escalate {
            format!("combined score {combined:.2} exceeds threshold {threshold:.2}")
        } else {
            format!("combined score {combined:.2} at or below threshold {threshold:.2}")
        };

        debug!(
            delta,
            similarity,
            pressure,
            combined,
            escalate = should_escalate,
            "Tier 1 scored"
        );

        QuickAssessmentResult {
            combined_score: combined,
            delta_score: delta,
            similarity_score: similarity,
            pressure_score: pressure,
            should_escalate_to_tier2: should_escalate,
            escalation_reason,
            relevant_context,
        }
    }
}
