//! Model-call instrumentation and cost accounting for Stride.
//!
//! Every Tier 2 model call is wrapped in a [`CallRecord`] that always yields
//! an [`AgentRun`], success or failure, with token counts, latency and an
//! estimated cost from the built-in [`PricingTable`].

pub mod model;
pub mod pricing;

pub use model::{AgentRun, AgentStage, CallRecord, CostSummary, ModelCost};
pub use pricing::{ModelPricing, PricingTable};
