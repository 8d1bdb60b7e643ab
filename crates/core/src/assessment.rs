//! Values passed between pipeline stages.

use serde::{Deserialize, Serialize};

/// Output of the Tier 2 situational assessment stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SituationalAssessment {
    pub summary: String,
    #[serde(default)]
    pub key_concerns: Vec<String>,
    #[serde(default)]
    pub opportunities: Vec<String>,
    /// Short description of the user's apparent state (energy, load, momentum).
    #[serde(default)]
    pub user_state: String,
    /// "low", "medium" or "high".
    #[serde(default)]
    pub urgency: String,
}

/// Run-scoped context handed to retrieval and policy collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineContext {
    pub user_id: String,
    pub batch_id: String,
    #[serde(default)]
    pub triggered_rule_ids: Vec<String>,
    /// Context gathered by Tier 1, forwarded to Tier 2 prompts.
    #[serde(default)]
    pub tier1_context: Option<String>,
    /// Effective stop point, once known.
    #[serde(default)]
    pub tier: Option<String>,
}

impl PipelineContext {
    pub fn new(user_id: impl Into<String>, batch_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            batch_id: batch_id.into(),
            ..Default::default()
        }
    }
}
