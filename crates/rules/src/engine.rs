//! Concurrent rule fan-out and fan-in.

use crate::escalation::{self, EscalationReason};
use crate::{Rule, RuleResult, default_rules};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use stride_config::RulesConfig;
use stride_core::{Error, RecommendationCandidate, Severity, SignalEntry, StateSnapshot};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Aggregated Tier 0 output for one batch.
#[derive(Debug, Clone, Serialize)]
pub struct RuleEvaluationResult {
    /// One entry per configured rule, in configuration order.
    pub all_results: Vec<RuleResult>,
    pub triggered_rules: Vec<RuleResult>,
    /// Direct recommendations of triggered rules, best score first.
    pub direct_recommendations: Vec<RecommendationCandidate>,
    pub should_escalate_to_tier1: bool,
    pub escalation_reason: EscalationReason,
}

impl RuleEvaluationResult {
    pub fn triggered_ids(&self) -> Vec<String> {
        self.triggered_rules.iter().map(|r| r.rule_id.clone()).collect()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.triggered_rules.iter().map(|r| r.severity).max()
    }

    /// Rules that errored, panicked or did not finish in time.
    pub fn failed_rules(&self) -> impl Iterator<Item = &RuleResult> {
        self.all_results.iter().filter(|r| r.error().is_some())
    }
}

/// Runs a fixed set of rules against a snapshot.
pub struct RuleEngine {
    rules: Vec<Arc<dyn Rule>>,
    timeout: Duration,
}

impl RuleEngine {
    pub fn new(rules: Vec<Arc<dyn Rule>>) -> Self {
        Self {
            rules,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Overall bound on one evaluation. Rules still running when it
    /// elapses are reported as failed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from configuration. An empty `enabled` list means the whole
    /// catalog; an unknown id is a configuration error.
    pub fn from_config(config: &RulesConfig) -> stride_core::Result<Self> {
        let catalog = default_rules();
        let rules = if config.enabled.is_empty() {
            catalog
        } else {
            config
                .enabled
                .iter()
                .map(|id| {
                    catalog
                        .iter()
                        .find(|r| r.id() == id)
                        .cloned()
                        .ok_or_else(|| Error::Config {
                            message: format!("unknown rule '{id}'"),
                        })
                })
                .collect::<stride_core::Result<Vec<_>>>()?
        };
        Ok(Self::new(rules).with_timeout(Duration::from_millis(config.timeout_ms)))
    }

    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.id()).collect()
    }

    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule concurrently.
    ///
    /// A rule that errors or panics yields a failed, non-triggered result;
    /// the batch still completes. Only cancellation aborts the call.
    pub async fn evaluate(
        &self,
        state: Arc<StateSnapshot>,
        signals: Arc<[SignalEntry]>,
        cancel: &CancellationToken,
    ) -> stride_core::Result<RuleEvaluationResult> {
        let mut join_set = JoinSet::new();
        for (idx, rule) in self.rules.iter().cloned().enumerate() {
            let state = Arc::clone(&state);
            let signals = Arc::clone(&signals);
            join_set.spawn(async move {
                let rule_id = rule.id().to_string();
                let outcome =
                    tokio::task::spawn_blocking(move || rule.evaluate(&state, &signals)).await;
                let result = match outcome {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => {
                        warn!(rule = %rule_id, error = %e, "Rule evaluation failed");
                        RuleResult::failed(&rule_id, e.to_string())
                    }
                    Err(join) => {
                        let message = panic_message(join);
                        warn!(rule = %rule_id, panic = %message, "Rule panicked");
                        RuleResult::failed(&rule_id, format!("panicked: {message}"))
                    }
                };
                (idx, result)
            });
        }

        let mut slots: Vec<Option<RuleResult>> = vec![None; self.rules.len()];
        let mut timed_out = false;
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    join_set.abort_all();
                    return Err(Error::Cancelled);
                }
                _ = &mut deadline => {
                    timed_out = true;
                    join_set.abort_all();
                    break;
                }
                joined = join_set.join_next() => match joined {
                    Some(Ok((idx, result))) => slots[idx] = Some(result),
                    Some(Err(e)) => warn!(error = %e, "Rule task did not join"),
                    None => break,
                },
            }
        }

        let all_results: Vec<RuleResult> = slots
            .into_iter()
            .zip(&self.rules)
            .map(|(slot, rule)| {
                slot.unwrap_or_else(|| {
                    let reason = if timed_out { "timed out" } else { "did not complete" };
                    warn!(rule = %rule.id(), reason, "Rule produced no result");
                    RuleResult::failed(rule.id(), reason)
                })
            })
            .collect();

        let triggered_rules: Vec<RuleResult> =
            all_results.iter().filter(|r| r.triggered).cloned().collect();

        let mut direct_recommendations: Vec<RecommendationCandidate> = triggered_rules
            .iter()
            .filter_map(|r| r.direct_recommendation.clone())
            .collect();
        direct_recommendations.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.source_rule.cmp(&b.source_rule))
        });

        let escalation_reason = escalation::decide(&triggered_rules, &direct_recommendations);
        let should_escalate_to_tier1 = escalation_reason.escalates();

        debug!(
            results = ?all_results.iter().map(|r| (&r.rule_id, r.triggered)).collect::<Vec<_>>(),
            "Rule results collected"
        );
        info!(
            rules = all_results.len(),
            triggered = triggered_rules.len(),
            recommendations = direct_recommendations.len(),
            escalate = should_escalate_to_tier1,
            reason = %escalation_reason,
            "Tier 0 evaluation complete"
        );

        Ok(RuleEvaluationResult {
            all_results,
            triggered_rules,
            direct_recommendations,
            should_escalate_to_tier1,
            escalation_reason,
        })
    }
}

fn panic_message(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
