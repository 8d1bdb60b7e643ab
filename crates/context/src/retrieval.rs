//! Context retrievers: a no-op and a keyword-overlap in-memory store.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stride_core::error::CollaboratorError;
use stride_core::{
    ContextBundle, ContextRetriever, ContextSnippet, PipelineContext, SimilarityMatch,
    SituationalAssessment, StateSnapshot,
};
use tokio::sync::RwLock;

/// Snippets returned per retrieval call.
const DEFAULT_LIMIT: usize = 5;

/// A retriever that finds nothing. Tier 1 sees a similarity of 0.
pub struct NoopRetriever;

#[async_trait]
impl ContextRetriever for NoopRetriever {
    async fn find_similar(
        &self,
        _user_id: &str,
        _query: &str,
    ) -> Result<SimilarityMatch, CollaboratorError> {
        Ok(SimilarityMatch::default())
    }

    async fn retrieve_for_assessment(
        &self,
        _state: &StateSnapshot,
        _context: &PipelineContext,
    ) -> Result<ContextBundle, CollaboratorError> {
        Ok(ContextBundle::default())
    }

    async fn retrieve_for_selection(
        &self,
        _assessment: &SituationalAssessment,
        _context: &PipelineContext,
        _user_id: &str,
    ) -> Result<ContextBundle, CollaboratorError> {
        Ok(ContextBundle::default())
    }
}

#[derive(Debug, Clone)]
struct StoredSnippet {
    source: String,
    content: String,
    terms: HashSet<String>,
}

/// Keyword-overlap retrieval over snippets held in memory, per user.
///
/// Stands in for the vector store in tests and offline runs. Relevance is the
/// share of query terms present in the snippet.
pub struct InMemoryRetriever {
    snippets: Arc<RwLock<HashMap<String, Vec<StoredSnippet>>>>,
    limit: usize,
}

impl InMemoryRetriever {
    pub fn new() -> Self {
        Self {
            snippets: Arc::new(RwLock::new(HashMap::new())),
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// Store a snippet for a user.
    pub async fn store(
        &self,
        user_id: impl Into<String>,
        source: impl Into<String>,
        content: impl Into<String>,
    ) {
        let content = content.into();
        let terms = terms(&content);
        self.snippets
            .write()
            .await
            .entry(user_id.into())
            .or_default()
            .push(StoredSnippet {
                source: source.into(),
                content,
                terms,
            });
    }

    pub async fn count(&self, user_id: &str) -> usize {
        self.snippets
            .read()
            .await
            .get(user_id)
            .map_or(0, |v| v.len())
    }

    async fn search(&self, user_id: &str, query: &str) -> Vec<ContextSnippet> {
        let query_terms = terms(query);
        if query_terms.is_empty() {
            return Vec::new();
        }

        let snippets = self.snippets.read().await;
        let Some(stored) = snippets.get(user_id) else {
            return Vec::new();
        };

        let mut results: Vec<ContextSnippet> = stored
            .iter()
            .filter_map(|s| {
                let hits = query_terms.intersection(&s.terms).count();
                (hits > 0).then(|| ContextSnippet {
                    source: s.source.clone(),
                    content: s.content.clone(),
                    score: hits as f64 / query_terms.len() as f64,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.content.cmp(&b.content))
        });
        results.truncate(self.limit);
        results
    }
}

impl Default for InMemoryRetriever {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercased words of three or more characters.
fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_lowercase)
        .collect()
}

/// Query text describing what is currently open in the snapshot.
fn state_query(state: &StateSnapshot, context: &PipelineContext) -> String {
    let mut parts: Vec<&str> = Vec::new();
    parts.extend(
        state
            .goals
            .iter()
            .filter(|g| g.status.is_open())
            .map(|g| g.title.as_str()),
    );
    parts.extend(
        state
            .habits
            .iter()
            .filter(|h| h.status.is_open())
            .map(|h| h.title.as_str()),
    );
    parts.extend(
        state
            .tasks
            .iter()
            .filter(|t| t.status.is_open())
            .map(|t| t.title.as_str()),
    );
    parts.extend(context.triggered_rule_ids.iter().map(String::as_str));
    parts.join(" ")
}

#[async_trait]
impl ContextRetriever for InMemoryRetriever {
    async fn find_similar(
        &self,
        user_id: &str,
        query: &str,
    ) -> Result<SimilarityMatch, CollaboratorError> {
        let snippets = self.search(user_id, query).await;
        let score = snippets.first().map_or(0.0, |s| s.score);
        Ok(SimilarityMatch { score, snippets })
    }

    async fn retrieve_for_assessment(
        &self,
        state: &StateSnapshot,
        context: &PipelineContext,
    ) -> Result<ContextBundle, CollaboratorError> {
        let query = state_query(state, context);
        Ok(ContextBundle {
            snippets: self.search(&state.user_id, &query).await,
        })
    }

    async fn retrieve_for_selection(
        &self,
        assessment: &SituationalAssessment,
        _context: &PipelineContext,
        user_id: &str,
    ) -> Result<ContextBundle, CollaboratorError> {
        let mut query = assessment.summary.clone();
        for concern in &assessment.key_concerns {
            query.push(' ');
            query.push_str(concern);
        }
        Ok(ContextBundle {
            snippets: self.search(user_id, &query).await,
        })
    }
}
