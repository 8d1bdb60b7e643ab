//! Configuration loading, validation, and management for Stride.
//!
//! Loads configuration from `~/.stride/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.stride/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Model transport endpoint and credentials
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Tier 0 rule selection and fan-in bound
    #[serde(default)]
    pub rules: RulesConfig,

    /// Tier 1 gate weighting
    #[serde(default)]
    pub tier1: Tier1Config,

    /// Tier 2 model stages
    #[serde(default)]
    pub tier2: Tier2Config,

    /// Early-exit ranking
    #[serde(default)]
    pub ranker: RankerConfig,

    /// Policy gate applied at every exit
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Cost accounting
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Rule ids to run. Empty means every rule in the catalog.
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Overall bound on the rule fan-in, in milliseconds
    #[serde(default = "default_rule_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_rule_timeout_ms() -> u64 {
    2_000
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            enabled: vec![],
            timeout_ms: default_rule_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier1Config {
    /// Combined score above which Tier 2 runs
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: f64,

    #[serde(default = "default_delta_weight")]
    pub delta_weight: f64,

    #[serde(default = "default_similarity_weight")]
    pub similarity_weight: f64,

    #[serde(default = "default_pressure_weight")]
    pub pressure_weight: f64,
}

fn default_escalation_threshold() -> f64 {
    0.6
}
fn default_delta_weight() -> f64 {
    0.5
}
fn default_similarity_weight() -> f64 {
    0.3
}
fn default_pressure_weight() -> f64 {
    0.2
}

impl Default for Tier1Config {
    fn default() -> Self {
        Self {
            escalation_threshold: default_escalation_threshold(),
            delta_weight: default_delta_weight(),
            similarity_weight: default_similarity_weight(),
            pressure_weight: default_pressure_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier2Config {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Model used for the situational assessment stage
    #[serde(default = "default_model")]
    pub assessment_model: String,

    /// Model used for the candidate selection stage
    #[serde(default = "default_model")]
    pub selection_model: String,

    /// Per-call timeout, independent of caller cancellation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_true() -> bool {
    true
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_timeout_secs() -> u64 {
    45
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    2048
}

impl Default for Tier2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            assessment_model: default_model(),
            selection_model: default_model(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankerConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    5
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Approve at most this many recommendations per run (0 = unlimited)
    #[serde(default)]
    pub max_per_run: usize,

    /// Reject recommendations whose target entity is absent from the snapshot
    #[serde(default = "default_true")]
    pub require_existing_target: bool,

    /// Declarative policy contracts
    #[serde(default)]
    pub contracts: Vec<ContractConfig>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_per_run: 0,
            require_existing_target: true,
            contracts: vec![],
        }
    }
}

/// Configuration for one policy contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Unique name for this contract
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Which candidates the contract applies to (e.g. "*", "action:defer", "target:habit")
    #[serde(default = "default_trigger")]
    pub trigger: String,

    /// Condition expression (e.g. `rec.score > 0.9`)
    #[serde(default)]
    pub condition: String,

    /// Action to take: "allow", "deny", "warn", "cap"
    #[serde(default = "default_deny")]
    pub action: String,

    /// Message recorded when the contract fires
    #[serde(default)]
    pub message: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Priority (higher = evaluated first)
    #[serde(default)]
    pub priority: i32,

    /// Upper bound applied by "cap" contracts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_cap: Option<f64>,
}

fn default_trigger() -> String {
    "*".into()
}
fn default_deny() -> String {
    "deny".into()
}

/// Cost accounting configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Custom model pricing overrides (model name → pricing)
    #[serde(default)]
    pub custom_pricing: HashMap<String, PricingOverrideConfig>,
}

/// Custom per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingOverrideConfig {
    /// Price per 1M input tokens in USD
    pub input_per_m: f64,
    /// Price per 1M output tokens in USD
    pub output_per_m: f64,
    /// Price per 1M cached input tokens in USD (defaults to the input price)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_per_m: Option<f64>,
}

impl PipelineConfig {
    /// Load configuration from the default path (~/.stride/config.toml).
    ///
    /// Also checks environment variables:
    /// - `STRIDE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `STRIDE_API_URL`
    /// - `STRIDE_MODEL` (both Tier 2 stages)
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in `load`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("STRIDE_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(url) = lookup("STRIDE_API_URL") {
            self.provider.api_url = url;
        }

        if let Some(model) = lookup("STRIDE_MODEL") {
            self.tier2.assessment_model = model.clone();
            self.tier2.selection_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".stride")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t1 = &self.tier1;
        if !(0.0..=1.0).contains(&t1.escalation_threshold) {
            return Err(ConfigError::ValidationError(
                "tier1.escalation_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if [t1.delta_weight, t1.similarity_weight, t1.pressure_weight]
            .iter()
            .any(|w| *w < 0.0)
        {
            return Err(ConfigError::ValidationError(
                "tier1 weights must be non-negative".into(),
            ));
        }

        if t1.delta_weight + t1.similarity_weight + t1.pressure_weight <= 0.0 {
            return Err(ConfigError::ValidationError(
                "tier1 weights must sum to > 0".into(),
            ));
        }

        if self.tier2.temperature < 0.0 || self.tier2.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "tier2.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.tier2.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tier2.timeout_secs must be > 0".into(),
            ));
        }

        if self.rules.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "rules.timeout_ms must be > 0".into(),
            ));
        }

        if self.ranker.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "ranker.max_results must be > 0".into(),
            ));
        }

        for contract in &self.policy.contracts {
            if contract.action == "cap" && contract.score_cap.is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "policy contract '{}' uses action \"cap\" without score_cap",
                    contract.name
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `config` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for stride_core::Error {
    fn from(e: ConfigError) -> Self {
        stride_core::Error::Config {
            message: e.to_string(),
        }
    }
}
