//! In-memory delta baselines. Nothing survives a restart.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use stride_core::error::CollaboratorError;
use stride_core::{DeltaService, SignalEntry, StateSnapshot};
use tokio::sync::RwLock;
use tracing::debug;

/// Share of the delta driven by entity changes; the rest follows signal volume.
const ENTITY_SHARE: f64 = 0.8;

/// Signal count at which the volume component saturates.
const SIGNAL_SATURATION: f64 = 10.0;

/// Entity key → content fingerprint.
type Fingerprint = HashMap<String, u64>;

/// Stores one fingerprint per user and scores changes against it.
///
/// A user with no recorded baseline has a delta of 1.0.
pub struct InMemoryDeltaService {
    baselines: Arc<RwLock<HashMap<String, Fingerprint>>>,
}

impl InMemoryDeltaService {
    pub fn new() -> Self {
        Self {
            baselines: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn has_baseline(&self, user_id: &str) -> bool {
        self.baselines.read().await.contains_key(user_id)
    }

    fn fingerprint(state: &StateSnapshot) -> Fingerprint {
        let mut prints = HashMap::new();
        insert_all(&mut prints, "goal", state.goals.iter().map(|g| (&g.id, g)));
        insert_all(&mut prints, "habit", state.habits.iter().map(|h| (&h.id, h)));
        insert_all(&mut prints, "task", state.tasks.iter().map(|t| (&t.id, t)));
        insert_all(&mut prints, "project", state.projects.iter().map(|p| (&p.id, p)));
        insert_all(&mut prints, "experiment", state.experiments.iter().map(|e| (&e.id, e)));
        insert_all(&mut prints, "check_in", state.check_ins.iter().map(|c| (&c.id, c)));
        insert_all(&mut prints, "metric", state.metrics.iter().map(|m| (&m.id, m)));
        prints
    }

    /// Fraction of entities added, removed, or changed across the union.
    fn entity_delta(baseline: &Fingerprint, current: &Fingerprint) -> f64 {
        let union: HashSet<&String> = baseline.keys().chain(current.keys()).collect();
        if union.is_empty() {
            return 0.0;
        }
        let changed = union
            .iter()
            .filter(|key| baseline.get(**key) != current.get(**key))
            .count();
        changed as f64 / union.len() as f64
    }
}

impl Default for InMemoryDeltaService {
    fn default() -> Self {
        Self::new()
    }
}

fn insert_all<'a, T: Serialize + 'a>(
    prints: &mut Fingerprint,
    kind: &str,
    items: impl Iterator<Item = (&'a String, &'a T)>,
) {
    for (id, item) in items {
        let mut hasher = DefaultHasher::new();
        serde_json::to_string(item).unwrap_or_default().hash(&mut hasher);
        prints.insert(format!("{kind}:{id}"), hasher.finish());
    }
}

#[async_trait]
impl DeltaService for InMemoryDeltaService {
    async fn calculate_delta(
        &self,
        user_id: &str,
        state: &StateSnapshot,
        signals: &[SignalEntry],
    ) -> Result<f64, CollaboratorError> {
        let baselines = self.baselines.read().await;
        let Some(baseline) = baselines.get(user_id) else {
            debug!(user_id, "No baseline recorded, treating state as fully changed");
            return Ok(1.0);
        };

        let current = Self::fingerprint(state);
        let entity = Self::entity_delta(baseline, &current);
        let volume = (signals.len() as f64 / SIGNAL_SATURATION).min(1.0);
        let delta = ENTITY_SHARE * entity + (1.0 - ENTITY_SHARE) * volume;

        debug!(user_id, entity, volume, delta, "Computed state delta");
        Ok(delta.clamp(0.0, 1.0))
    }

    async fn record_baseline(
        &self,
        user_id: &str,
        state: &StateSnapshot,
    ) -> Result<(), CollaboratorError> {
        let fingerprint = Self::fingerprint(state);
        self.baselines
            .write()
            .await
            .insert(user_id.to_string(), fingerprint);
        Ok(())
    }
}
