//! Delta/baseline collaborator used by Tier 1.

use crate::error::CollaboratorError;
use crate::signal::SignalEntry;
use crate::snapshot::StateSnapshot;
use async_trait::async_trait;

/// Measures how much a user's state moved since the last recorded baseline.
///
/// Baselines are written only through [`DeltaService::record_baseline`], which
/// the engine calls after a successful Tier 2 run.
#[async_trait]
pub trait DeltaService: Send + Sync {
    /// A delta score in `[0, 1]`; 1 means everything changed.
    async fn calculate_delta(
        &self,
        user_id: &str,
        state: &StateSnapshot,
        signals: &[SignalEntry],
    ) -> Result<f64, CollaboratorError>;

    async fn record_baseline(
        &self,
        user_id: &str,
        state: &StateSnapshot,
    ) -> Result<(), CollaboratorError>;
}
