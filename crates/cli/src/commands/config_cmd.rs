//! `stride config`: configuration management commands.

use std::path::{Path, PathBuf};
use stride_config::PipelineConfig;
use stride_rules::RuleEngine;

use super::load_config;

pub async fn default() -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", PipelineConfig::default_toml());
    Ok(())
}

pub async fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating {}", resolve_path(config_path).display());

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("   config error: {e}");
            return Err(e.into());
        }
    };
    println!("   config parsed successfully");

    // Rule ids and contracts are only checked by the crates that use them.
    RuleEngine::from_config(&config.rules)?;
    stride_policy::ContractPolicyEnforcer::from_config(&config.policy)?;

    let warnings = warnings(&config);
    if warnings.is_empty() {
        println!("   all checks passed");
    } else {
        println!();
        for w in &warnings {
            println!("   warning: {w}");
        }
    }

    println!();
    println!("   Provider:   {}", config.provider.api_url);
    println!(
        "   Models:     {} / {}",
        config.tier2.assessment_model, config.tier2.selection_model
    );
    println!("   Threshold:  {}", config.tier1.escalation_threshold);
    println!("   Contracts:  {}", config.policy.contracts.len());
    Ok(())
}

pub async fn show(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some("<redacted>".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", resolve_path(config_path).display());
    Ok(())
}

fn resolve_path(config_path: Option<&Path>) -> PathBuf {
    config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PipelineConfig::config_dir().join("config.toml"))
}

/// Settings that load fine but probably don't do what the user wants.
fn warnings(config: &PipelineConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if config.tier2.enabled && !config.has_api_key() {
        warnings.push("Model stage enabled but no API key (set STRIDE_API_KEY or OPENAI_API_KEY)");
    }
    if config.tier1.escalation_threshold >= 1.0 {
        warnings.push("tier1.escalation_threshold of 1.0 never escalates to the model stage");
    }
    if !config.tier2.enabled {
        warnings.push("Model stage disabled; escalations stop at Tier 1");
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_is_valid() {
        let path = resolve_path(None);
        assert!(path.to_str().unwrap().contains("config.toml"));
    }

    #[test]
    fn explicit_path_wins() {
        assert_eq!(resolve_path(Some(Path::new("/etc/stride.toml"))), PathBuf::from("/etc/stride.toml"));
    }

    #[test]
    fn keyless_default_config_warns() {
        let mut config = PipelineConfig::default();
        config.provider.api_key = None;
        assert_eq!(warnings(&config).len(), 1);
    }

    #[test]
    fn default_toml_round_trips() {
        let parsed: PipelineConfig = toml::from_str(&PipelineConfig::default_toml()).unwrap();
        assert_eq!(parsed.ranker.max_results, 5);
    }
}
