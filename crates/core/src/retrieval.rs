//! Similarity search and supporting-context retrieval.
//!
//! Embedding and vector search live outside this workspace; the pipeline
//! only sees scored text snippets.

use crate::assessment::{PipelineContext, SituationalAssessment};
use crate::error::CollaboratorError;
use crate::snapshot::StateSnapshot;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    /// Where the snippet came from (e.g. "journal", "past_recommendation").
    pub source: String,
    pub content: String,
    /// Relevance in `[0, 1]`.
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextBundle {
    pub snippets: Vec<ContextSnippet>,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    /// Render as a bullet list for inclusion in a prompt.
    pub fn render(&self) -> String {
        self.snippets
            .iter()
            .map(|s| format!("- [{}] {}", s.source, s.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Result of a similarity lookup used by Tier 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    /// Best relevance found, in `[0, 1]`.
    pub score: f64,
    pub snippets: Vec<ContextSnippet>,
}

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Similarity lookup for a free-text query.
    async fn find_similar(
        &self,
        user_id: &str,
        query: &str,
    ) -> Result<SimilarityMatch, CollaboratorError>;

    /// Supporting context for the situational assessment stage.
    async fn retrieve_for_assessment(
        &self,
        state: &StateSnapshot,
        context: &PipelineContext,
    ) -> Result<ContextBundle, CollaboratorError>;

    /// Supporting context for the candidate selection stage.
    async fn retrieve_for_selection(
        &self,
        assessment: &SituationalAssessment,
        context: &PipelineContext,
        user_id: &str,
    ) -> Result<ContextBundle, CollaboratorError>;
}
