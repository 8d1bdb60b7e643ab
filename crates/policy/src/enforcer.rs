//! Policy enforcement over recommendation candidates.
//!
//! The enforcer takes the candidates of whichever tier stopped the pipeline
//! and partitions them into approved and rejected. It never adds candidates
//! and never fails on well-formed input.

use crate::model::{Action, Contract, ContractSet};
use crate::parser::{Condition, EvalContext};
use crate::PolicyError;
use serde::{Deserialize, Serialize};
use stride_config::PolicyConfig;
use stride_core::{PipelineContext, RecommendationCandidate, StateSnapshot};
use tracing::{debug, info, warn};

/// Name recorded for the built-in target existence check.
pub const TARGET_EXISTS: &str = "target_exists";
/// Name recorded for the built-in per-run limit.
pub const MAX_PER_RUN: &str = "max_per_run";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Approved, but noted.
    Warning,
    Rejected,
    /// Approved after an adjustment.
    Modified,
}

/// One policy finding about one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    /// `kind:id` of the candidate's target, when it has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedRecommendation {
    pub recommendation: RecommendationCandidate,
    pub rule_violated: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyEnforcementResult {
    pub approved: Vec<RecommendationCandidate>,
    pub rejected: Vec<RejectedRecommendation>,
    pub violations: Vec<PolicyViolation>,
}

impl PolicyEnforcementResult {
    /// Everything approved, nothing noted.
    pub fn approve_all(recommendations: Vec<RecommendationCandidate>) -> Self {
        Self {
            approved: recommendations,
            ..Default::default()
        }
    }

    /// Whether enforcement rejected, modified or flagged anything.
    pub fn had_adjustments(&self) -> bool {
        !self.rejected.is_empty() || !self.violations.is_empty()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    fn reject(&mut self, recommendation: RecommendationCandidate, rule: &str, reason: String) {
        self.violations.push(PolicyViolation {
            rule: rule.to_string(),
            severity: ViolationSeverity::Rejected,
            message: reason.clone(),
            target: target_label(&recommendation),
        });
        self.rejected.push(RejectedRecommendation {
            recommendation,
            rule_violated: rule.to_string(),
            reason,
        });
    }

    fn note(&mut self, recommendation: &RecommendationCandidate, rule: &str, severity: ViolationSeverity, message: String) {
        self.violations.push(PolicyViolation {
            rule: rule.to_string(),
            severity,
            message,
            target: target_label(recommendation),
        });
    }
}

fn target_label(candidate: &RecommendationCandidate) -> Option<String> {
    candidate
        .target_entity_id
        .as_ref()
        .map(|id| format!("{}:{id}", candidate.target_kind))
}

/// Validates candidates against hard constraints before they are returned.
pub trait PolicyEnforcer: Send + Sync {
    fn enforce(
        &self,
        recommendations: Vec<RecommendationCandidate>,
        state: &StateSnapshot,
        context: &PipelineContext,
    ) -> PolicyEnforcementResult;
}

/// Approves everything.
pub struct PassthroughEnforcer;

impl PolicyEnforcer for PassthroughEnforcer {
    fn enforce(
        &self,
        recommendations: Vec<RecommendationCandidate>,
        _state: &StateSnapshot,
        _context: &PipelineContext,
    ) -> PolicyEnforcementResult {
        PolicyEnforcementResult::approve_all(recommendations)
    }
}

/// Built-in structural checks plus declarative contracts.
///
/// Per candidate, in order: the target must exist in the snapshot (when
/// enabled), then the highest-priority matching contract decides, then the
/// per-run limit applies to whatever is still approved.
pub struct ContractPolicyEnforcer {
    /// Enabled contracts with compiled conditions, highest priority first.
    contracts: Vec<(Contract, Condition)>,
    require_existing_target: bool,
    max_per_run: usize,
}

impl ContractPolicyEnforcer {
    pub fn new(set: ContractSet) -> Result<Self, PolicyError> {
        set.validate()?;
        let mut contracts = Vec::with_capacity(set.contracts.len());
        for contract in set.contracts.into_iter().filter(|c| c.enabled) {
            let condition = crate::parse_condition(&contract.condition).map_err(|detail| {
                PolicyError::ConditionParseError {
                    name: contract.name.clone(),
                    detail,
                }
            })?;
            contracts.push((contract, condition));
        }
        // Stable: ties keep declaration order.
        contracts.sort_by(|a, b| b.0.priority.cmp(&a.0.priority));

        Ok(Self {
            contracts,
            require_existing_target: true,
            max_per_run: 0,
        })
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self, PolicyError> {
        let enforcer = Self::new(ContractSet::from_config(&config.contracts)?)?
            .require_existing_target(config.require_existing_target)
            .with_max_per_run(config.max_per_run);
        info!(
            contracts = enforcer.contracts.len(),
            max_per_run = enforcer.max_per_run,
            "Policy enforcer configured"
        );
        Ok(enforcer)
    }

    pub fn require_existing_target(mut self, enabled: bool) -> Self {
        self.require_existing_target = enabled;
        self
    }

    /// 0 means unlimited.
    pub fn with_max_per_run(mut self, max: usize) -> Self {
        self.max_per_run = max;
        self
    }

    pub fn active_count(&self) -> usize {
        self.contracts.len()
    }

    fn first_match(
        &self,
        candidate: &RecommendationCandidate,
        ctx: &EvalContext<'_>,
    ) -> Option<&Contract> {
        self.contracts
            .iter()
            .find(|(contract, condition)| contract.trigger.matches(candidate) && condition.evaluate(ctx))
            .map(|(contract, _)| contract)
    }
}

impl PolicyEnforcer for ContractPolicyEnforcer {
    fn enforce(
        &self,
        recommendations: Vec<RecommendationCandidate>,
        state: &StateSnapshot,
        context: &PipelineContext,
    ) -> PolicyEnforcementResult {
        let mut result = PolicyEnforcementResult::default();

        for mut candidate in recommendations {
            if self.require_existing_target
                && let Some(id) = candidate.target_entity_id.as_deref()
                && !state.contains_entity(candidate.target_kind, id)
            {
                let reason = format!("{} {id} is not in the snapshot", candidate.target_kind);
                warn!(rule = TARGET_EXISTS, %reason, "Policy rejected recommendation");
                result.reject(candidate, TARGET_EXISTS, reason);
                continue;
            }

            let rec_json = match serde_json::to_value(&candidate) {
                Ok(v) => v,
                Err(e) => {
                    // Conditions cannot see this candidate; contracts are skipped.
                    warn!(error = %e, "Could not serialize candidate for policy evaluation");
                    serde_json::Value::Null
                }
            };
            let ctx = EvalContext {
                rec: &rec_json,
                tier: context.tier.as_deref(),
                user_id: &context.user_id,
            };

            if let Some(contract) = self.first_match(&candidate, &ctx) {
                let message = contract.message_or_default();
                match contract.action {
                    Action::Deny => {
                        warn!(contract = %contract.name, title = %candidate.title, "Policy denied recommendation");
                        result.reject(candidate, &contract.name, message);
                        continue;
                    }
                    Action::Warn => {
                        warn!(contract = %contract.name, title = %candidate.title, "Policy warning: {message}");
                        result.note(&candidate, &contract.name, ViolationSeverity::Warning, message);
                    }
                    Action::Cap => {
                        let cap = contract.score_cap.unwrap_or(1.0);
                        if candidate.score > cap {
                            debug!(contract = %contract.name, from = candidate.score, to = cap, "Policy capped score");
                            candidate.score = cap;
                            result.note(&candidate, &contract.name, ViolationSeverity::Modified, message);
                        }
                    }
                    Action::Allow => {
                        debug!(contract = %contract.name, "Policy explicitly allowed recommendation");
                    }
                }
            }

            if self.max_per_run > 0 && result.approved.len() >= self.max_per_run {
                let reason = format!("run already has {} approved recommendations", self.max_per_run);
                result.reject(candidate, MAX_PER_RUN, reason);
                continue;
            }

            result.approved.push(candidate);
        }

        if result.had_adjustments() {
            info!(
                approved = result.approved.len(),
                rejected = result.rejected.len(),
                violations = result.violations.len(),
                "Policy enforcement adjusted recommendations"
            );
        }
        result
    }
}
