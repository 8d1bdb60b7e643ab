//! # Stride Core
//!
//! Domain types, collaborator traits, and error definitions for the Stride
//! recommendation pipeline. This crate has **no async runtime dependency**: it
//! defines the read-only state snapshot the pipeline consumes, the candidate
//! recommendations it produces, and the traits every external collaborator
//! (model transport, delta baseline, retrieval, command bus) implements.
//!
//! ## Design Philosophy
//!
//! Every collaborator is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod assessment;
pub mod command;
pub mod delta;
pub mod error;
pub mod message;
pub mod provider;
pub mod recommendation;
pub mod retrieval;
pub mod signal;
pub mod snapshot;

// Re-export key types at crate root for ergonomics
pub use assessment::{PipelineContext, SituationalAssessment};
pub use command::{CommandBus, CommandOutcome, DomainCommand};
pub use delta::DeltaService;
pub use error::{Error, Result};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ResponseFormat, Usage};
pub use recommendation::{
    ActionKind, RecommendationCandidate, RecommendationContext, RecommendationType, Severity,
    TargetKind,
};
pub use retrieval::{ContextBundle, ContextRetriever, ContextSnippet, SimilarityMatch};
pub use signal::{SignalEntry, SignalType};
pub use snapshot::{
    Cadence, CheckIn, CheckInKind, EnergyLevel, EntityStatus, Experiment, Goal, Habit,
    MetricDefinition, Project, ScalingMode, StateSnapshot, Task,
};
