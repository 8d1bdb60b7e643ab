//! Policy contract data model.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use stride_config::ContractConfig;
use stride_core::{ActionKind, RecommendationCandidate, TargetKind};

use crate::PolicyError;

/// A set of contracts loaded from configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractSet {
    #[serde(default)]
    pub contracts: Vec<Contract>,
}

impl ContractSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load contracts from a TOML string of `[[contracts]]` tables.
    pub fn from_toml(toml_str: &str) -> Result<Self, PolicyError> {
        let set: ContractSet = toml::from_str(toml_str)?;
        set.validate()?;
        Ok(set)
    }

    /// Convert the `[[policy.contracts]]` section of the pipeline config.
    pub fn from_config(configs: &[ContractConfig]) -> Result<Self, PolicyError> {
        let contracts = configs
            .iter()
            .map(Contract::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let set = Self { contracts };
        set.validate()?;
        Ok(set)
    }

    pub fn add(&mut self, contract: Contract) {
        self.contracts.push(contract);
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        for contract in &self.contracts {
            contract.validate()?;
        }
        Ok(())
    }

    pub fn active_count(&self) -> usize {
        self.contracts.iter().filter(|c| c.enabled).count()
    }
}

/// One declarative constraint over recommendation candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Which candidates the contract looks at.
    #[serde(default)]
    pub trigger: Trigger,

    /// Empty means the contract fires on every matching candidate.
    #[serde(default)]
    pub condition: String,

    #[serde(default)]
    pub action: Action,

    #[serde(default)]
    pub message: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Higher is evaluated first. Ties keep declaration order.
    #[serde(default)]
    pub priority: i32,

    /// Upper bound applied by `cap` contracts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_cap: Option<f64>,
}

fn default_true() -> bool {
    true
}

impl Contract {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.name.is_empty() {
            return Err(PolicyError::InvalidContract {
                name: "(empty)".into(),
                reason: "contract name cannot be empty".into(),
            });
        }
        self.trigger.validate(&self.name)?;
        if self.action == Action::Cap {
            match self.score_cap {
                Some(cap) if (0.0..=1.0).contains(&cap) => {}
                Some(cap) => {
                    return Err(PolicyError::InvalidContract {
                        name: self.name.clone(),
                        reason: format!("score_cap {cap} is outside [0, 1]"),
                    });
                }
                None => {
                    return Err(PolicyError::InvalidContract {
                        name: self.name.clone(),
                        reason: "cap contracts need a score_cap".into(),
                    });
                }
            }
        }
        crate::parse_condition(&self.condition).map_err(|detail| {
            PolicyError::ConditionParseError {
                name: self.name.clone(),
                detail,
            }
        })?;
        Ok(())
    }

    /// Message to record when the contract fires.
    pub fn message_or_default(&self) -> String {
        if self.message.is_empty() {
            format!("Policy '{}' triggered", self.name)
        } else {
            self.message.clone()
        }
    }
}

impl TryFrom<&ContractConfig> for Contract {
    type Error = PolicyError;

    fn try_from(config: &ContractConfig) -> Result<Self, Self::Error> {
        let action = config
            .action
            .parse::<Action>()
            .map_err(|reason| PolicyError::InvalidContract {
                name: config.name.clone(),
                reason,
            })?;
        Ok(Self {
            name: config.name.clone(),
            description: config.description.clone(),
            trigger: Trigger::from(config.trigger.clone()),
            condition: config.condition.clone(),
            action,
            message: config.message.clone(),
            enabled: config.enabled,
            priority: config.priority,
            score_cap: config.score_cap,
        })
    }
}

/// Which candidates a contract applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Trigger {
    /// `*` or `any`
    #[default]
    Any,
    /// `action:<action_kind>`, e.g. `action:defer`
    Action(String),
    /// `target:<target_kind>`, e.g. `target:habit`
    Target(String),
}

impl Trigger {
    pub fn matches(&self, candidate: &RecommendationCandidate) -> bool {
        match self {
            Trigger::Any => true,
            Trigger::Action(name) => candidate.action_kind.as_str() == name,
            Trigger::Target(name) => candidate.target_kind.as_str() == name,
        }
    }

    fn validate(&self, contract_name: &str) -> Result<(), PolicyError> {
        let known = match self {
            Trigger::Any => true,
            Trigger::Action(name) => {
                serde_json::from_value::<ActionKind>(serde_json::Value::String(name.clone()))
                    .is_ok()
            }
            Trigger::Target(name) => {
                serde_json::from_value::<TargetKind>(serde_json::Value::String(name.clone()))
                    .is_ok()
            }
        };
        if known {
            Ok(())
        } else {
            Err(PolicyError::InvalidContract {
                name: contract_name.into(),
                reason: format!("unknown trigger '{}'", String::from(self.clone())),
            })
        }
    }
}

impl From<String> for Trigger {
    fn from(s: String) -> Self {
        match s.as_str() {
            "*" | "any" | "" => Trigger::Any,
            other => {
                if let Some(name) = other.strip_prefix("action:") {
                    Trigger::Action(name.to_string())
                } else if let Some(name) = other.strip_prefix("target:") {
                    Trigger::Target(name.to_string())
                } else {
                    // Bare name treated as an action kind.
                    Trigger::Action(other.to_string())
                }
            }
        }
    }
}

impl From<Trigger> for String {
    fn from(t: Trigger) -> Self {
        match t {
            Trigger::Any => "*".into(),
            Trigger::Action(name) => format!("action:{name}"),
            Trigger::Target(name) => format!("target:{name}"),
        }
    }
}

/// What happens when a contract's condition holds.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Approve without consulting lower-priority contracts.
    Allow,
    /// Reject the candidate.
    #[default]
    Deny,
    /// Approve, but record a warning.
    Warn,
    /// Approve with the score lowered to `score_cap`.
    Cap,
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(Action::Allow),
            "deny" | "reject" => Ok(Action::Deny),
            "warn" => Ok(Action::Warn),
            "cap" => Ok(Action::Cap),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(name: &str, trigger: Trigger, action: Action) -> Contract {
        Contract {
            name: name.into(),
            description: String::new(),
            trigger,
            condition: String::new(),
            action,
            message: String::new(),
            enabled: true,
            priority: 0,
            score_cap: None,
        }
    }

    #[test]
    fn trigger_from_string() {
        assert_eq!(Trigger::from(String::from("*")), Trigger::Any);
        assert_eq!(Trigger::from(String::from("any")), Trigger::Any);
        assert_eq!(
            Trigger::from(String::from("action:defer")),
            Trigger::Action("defer".into())
        );
        assert_eq!(
            Trigger::from(String::from("target:habit")),
            Trigger::Target("habit".into())
        );
        assert_eq!(
            Trigger::from(String::from("reschedule")),
            Trigger::Action("reschedule".into())
        );
    }

    #[test]
    fn trigger_matching() {
        let defer = RecommendationCandidate::new(ActionKind::Defer, TargetKind::Task, "x");
        assert!(Trigger::Any.matches(&defer));
        assert!(Trigger::Action("defer".into()).matches(&defer));
        assert!(!Trigger::Action("reflect".into()).matches(&defer));
        assert!(Trigger::Target("task".into()).matches(&defer));
        assert!(!Trigger::Target("habit".into()).matches(&defer));
    }

    #[test]
    fn unknown_trigger_kind_rejects() {
        let c = contract("bad", Trigger::Action("teleport".into()), Action::Deny);
        assert!(c.validate().is_err());
    }

    #[test]
    fn cap_requires_bound_in_range() {
        let mut c = contract("cap", Trigger::Any, Action::Cap);
        assert!(c.validate().is_err());
        c.score_cap = Some(1.5);
        assert!(c.validate().is_err());
        c.score_cap = Some(0.7);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn action_parsing() {
        assert_eq!("DENY".parse::<Action>().unwrap(), Action::Deny);
        assert_eq!("cap".parse::<Action>().unwrap(), Action::Cap);
        assert!("confirm".parse::<Action>().is_err());
        assert_eq!(Action::default(), Action::Deny);
    }

    #[test]
    fn contract_set_from_toml() {
        let toml = r#"
[[contracts]]
name = "no-defer-priority"
trigger = "action:defer"
condition = 'rec.score > 0.8'
action = "deny"
message = "High-confidence deferrals need a human"

[[contracts]]
name = "cap-habits"
trigger = "target:habit"
action = "cap"
score_cap = 0.7
"#;
        let set = ContractSet::from_toml(toml).unwrap();
        assert_eq!(set.active_count(), 2);
        assert_eq!(set.contracts[0].action, Action::Deny);
        assert_eq!(set.contracts[1].score_cap, Some(0.7));
    }

    #[test]
    fn contract_set_from_config() {
        let configs = vec![ContractConfig {
            name: "warn-reflect".into(),
            description: String::new(),
            trigger: "action:reflect".into(),
            condition: String::new(),
            action: "warn".into(),
            message: String::new(),
            enabled: true,
            priority: 1,
            score_cap: None,
        }];
        let set = ContractSet::from_config(&configs).unwrap();
        assert_eq!(set.contracts[0].action, Action::Warn);
        assert_eq!(set.contracts[0].trigger, Trigger::Action("reflect".into()));

        let bad = vec![ContractConfig {
            action: "explode".into(),
            ..configs[0].clone()
        }];
        assert!(ContractSet::from_config(&bad).is_err());
    }

    #[test]
    fn empty_name_rejects() {
        assert!(contract("", Trigger::Any, Action::Deny).validate().is_err());
    }
}
