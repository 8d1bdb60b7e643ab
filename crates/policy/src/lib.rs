//! Policy enforcement: hard constraints applied to recommendation
//! candidates before they leave the pipeline.
//!
//! The pipeline depends only on the [`PolicyEnforcer`] trait. The shipped
//! [`ContractPolicyEnforcer`] combines two structural checks (target must
//! exist in the snapshot, per-run limit) with declarative contracts loaded
//! from configuration:
//!
//! ```toml
//! [[policy.contracts]]
//! name = "no-confident-defer"
//! description = "Deferrals above 0.8 confidence need a human"
//! trigger = "action:defer"
//! condition = 'rec.score > 0.8 AND tier != "tier2_executed"'
//! action = "deny"
//! message = "Deferral held back for review"
//!
//! [[policy.contracts]]
//! name = "temper-habit-nudges"
//! trigger = "target:habit"
//! action = "cap"
//! score_cap = 0.7
//! ```
//!
//! Contract actions: `allow`, `deny` (rejected), `warn` (approved, flagged),
//! `cap` (approved, score lowered).

mod enforcer;
mod model;
mod parser;

pub use enforcer::{
    ContractPolicyEnforcer, MAX_PER_RUN, PassthroughEnforcer, PolicyEnforcementResult,
    PolicyEnforcer, PolicyViolation, RejectedRecommendation, TARGET_EXISTS, ViolationSeverity,
};
pub use model::{Action, Contract, ContractSet, Trigger};
pub use parser::parse_condition;

pub type PolicyResult<T> = std::result::Result<T, PolicyError>;

/// Errors from building a policy enforcer.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("invalid contract '{name}': {reason}")]
    InvalidContract { name: String, reason: String },

    #[error("condition parse error in contract '{name}': {detail}")]
    ConditionParseError { name: String, detail: String },

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}

impl From<PolicyError> for stride_core::Error {
    fn from(e: PolicyError) -> Self {
        stride_core::Error::Config {
            message: e.to_string(),
        }
    }
}
