//! `stride assess`: run the tiered pipeline once and print the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use stride_config::PipelineConfig;
use stride_context::{InMemoryDeltaService, NoopRetriever};
use stride_core::{Provider, SignalEntry, StateSnapshot};
use stride_engine::{ActionDispatcher, TieredAssessmentEngine, TieredAssessmentOutcome};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::dispatch::{LoggingBus, dispatch_all};
use super::{load_config, read_json};

pub struct AssessArgs {
    pub snapshot: PathBuf,
    pub signals: Option<PathBuf>,
    pub batch_id: Option<String>,
    pub offline: bool,
    pub dispatch: bool,
}

pub async fn run(config_path: Option<&Path>, args: AssessArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let state: StateSnapshot = read_json(&args.snapshot)?;
    state.validate()?;
    let signals: Vec<SignalEntry> = match &args.signals {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };

    let provider = if args.offline { None } else { model_provider(&config) };
    let engine = build_engine(&config, provider)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling assessment");
            on_interrupt.cancel();
        }
    });

    let batch_id = args
        .batch_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let outcome = engine
        .assess(Arc::new(state), signals.into(), batch_id, &cancel)
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if args.dispatch {
        dispatch_approved(&outcome).await;
    }
    Ok(())
}

/// The configured model transport, or `None` when the model stage cannot run.
fn model_provider(config: &PipelineConfig) -> Option<Arc<dyn Provider>> {
    if !config.tier2.enabled {
        return None;
    }
    match stride_providers::from_config(&config.provider) {
        Ok(provider) => Some(provider),
        Err(e) => {
            warn!("Model stage unavailable ({e}); assessing with rules only");
            None
        }
    }
}

/// Wire the engine with in-process collaborators.
pub fn build_engine(
    config: &PipelineConfig,
    provider: Option<Arc<dyn Provider>>,
) -> stride_core::Result<TieredAssessmentEngine> {
    TieredAssessmentEngine::from_config(
        config,
        provider,
        Arc::new(InMemoryDeltaService::new()),
        Arc::new(NoopRetriever),
    )
}

async fn dispatch_approved(outcome: &TieredAssessmentOutcome) {
    let approved = &outcome.policy.approved;
    if approved.is_empty() {
        info!("No approved recommendations to dispatch");
        return;
    }
    eprintln!("Dispatching {} approved recommendation(s):", approved.len());
    let dispatcher = ActionDispatcher::new(Arc::new(LoggingBus));
    dispatch_all(&dispatcher, approved).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use stride_engine::StopPoint;

    fn state() -> StateSnapshot {
        serde_json::from_value(serde_json::json!({
            "user_id": "u1",
            "as_of": "2026-03-10T07:30:00Z",
            "local_date": "2026-03-10",
            "habits": [{
                "id": "h1",
                "title": "Stretch",
                "scaling_mode": "minimum",
                "completed_last_7d": 1,
                "expected_last_7d": 5,
                "current_streak": 2,
            }],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn offline_engine_has_no_model_stage() {
        let engine = build_engine(&PipelineConfig::default(), None).unwrap();
        assert!(!engine.has_model_stage());
    }

    #[tokio::test]
    async fn offline_run_stops_before_the_model() {
        let engine = build_engine(&PipelineConfig::default(), None).unwrap();
        let outcome = engine
            .assess(Arc::new(state()), Arc::from(Vec::<SignalEntry>::new()), "b1", &CancellationToken::new())
            .await
            .unwrap();
        assert_ne!(outcome.stop_point, StopPoint::Tier2Executed);
        assert!(!outcome.tier2_executed);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["batch_id"], "b1");
    }

    #[test]
    fn disabled_model_stage_needs_no_provider() {
        let mut config = PipelineConfig::default();
        config.tier2.enabled = false;
        config.provider.api_key = Some("sk-test".into());
        assert!(model_provider(&config).is_none());
    }

    #[test]
    fn missing_api_key_degrades_to_rules_only() {
        let mut config = PipelineConfig::default();
        config.provider.api_key = None;
        assert!(model_provider(&config).is_none());
    }
}
