//! # Stride Engine
//!
//! Sequences the assessment tiers for one batch of signals:
//!
//! ```text
//! signals + state → Tier 0 rules ─┬─ stop (Tier0Only)
//!                                 └─ Tier 1 quick assessment ─┬─ stop (Tier1Stop)
//!                                                             └─ Tier 2 model stages (Tier2Executed)
//!                                                     every exit → policy → outcome
//! ```
//!
//! Also home to the [`ranker`] used on the early-exit paths and the
//! [`ActionDispatcher`] that turns an accepted recommendation into a domain
//! command.

pub mod dispatcher;
pub mod orchestrator;
pub mod prompts;
pub mod ranker;
pub mod tier1;
pub mod tiered;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use dispatcher::{ActionDispatcher, DispatchKey};
pub use orchestrator::{ModelOrchestrator, SelectionMethod, Tier2Result};
pub use ranker::rank;
pub use tier1::{DeltaSimilarityAssessor, QuickAssessmentResult, QuickAssessor};
pub use tiered::{AssessmentStatistics, StopPoint, TieredAssessmentEngine, TieredAssessmentOutcome};

/// The only failure that escapes an assessment run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("assessment cancelled")]
    Cancelled,
}

impl From<EngineError> for stride_core::Error {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Cancelled => stride_core::Error::Cancelled,
        }
    }
}
