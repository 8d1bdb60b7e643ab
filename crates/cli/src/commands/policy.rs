//! `stride policy`: inspect the declarative policy contracts.

use std::path::Path;
use stride_config::PipelineConfig;
use stride_policy::{ContractPolicyEnforcer, ContractSet};

use super::load_config;

/// List all configured contracts.
pub async fn list(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let set = ContractSet::from_config(&config.policy.contracts)?;

    if set.contracts.is_empty() {
        print_example();
        return Ok(());
    }

    println!("Policy contracts ({} active):\n", set.active_count());
    for (i, c) in set.contracts.iter().enumerate() {
        let status = if c.enabled { "ON " } else { "OFF" };
        let trigger: String = c.trigger.clone().into();
        let action = format!("{:?}", c.action).to_lowercase();
        println!(
            "  {}. [{}] {} (trigger: {}, action: {}, priority: {})",
            i + 1,
            status,
            c.name,
            trigger,
            action,
            c.priority
        );
        if !c.description.is_empty() {
            println!("     {}", c.description);
        }
        if !c.condition.is_empty() {
            println!("     condition: {}", c.condition);
        }
        if let Some(cap) = c.score_cap {
            println!("     score_cap: {cap}");
        }
        if !c.message.is_empty() {
            println!("     message: {}", c.message);
        }
    }
    print_structural(&config);
    Ok(())
}

/// Validate all contracts in the configuration.
pub async fn validate(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    match ContractPolicyEnforcer::from_config(&config.policy) {
        Ok(enforcer) => {
            println!(
                "All {} contracts are valid. {} active.",
                config.policy.contracts.len(),
                enforcer.active_count()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Contract validation failed: {e}");
            Err(e.into())
        }
    }
}

fn print_structural(config: &PipelineConfig) {
    println!();
    println!(
        "  target_exists: {}",
        if config.policy.require_existing_target { "on" } else { "off" }
    );
    match config.policy.max_per_run {
        0 => println!("  max_per_run:   unlimited"),
        n => println!("  max_per_run:   {n}"),
    }
}

fn print_example() {
    println!("No policy contracts configured.");
    println!("\nAdd contracts in config.toml:");
    println!("  [[policy.contracts]]");
    println!("  name = \"no-deferring-deadlines\"");
    println!("  trigger = \"action:defer\"");
    println!("  condition = 'rec.score > 0.8'");
    println!("  action = \"deny\"");
    println!("  message = \"Urgent work is not deferred automatically\"");
}
