//! Delta baseline and context retrieval implementations for Stride.

pub mod delta;
pub mod retrieval;

pub use delta::InMemoryDeltaService;
pub use retrieval::{InMemoryRetriever, NoopRetriever};
