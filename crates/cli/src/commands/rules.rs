//! `stride rules`: list the Tier 0 rule catalog.

use std::path::Path;
use stride_rules::{RuleEngine, default_rules};

use super::load_config;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    let engine = RuleEngine::from_config(&config.rules)?;
    let enabled = engine.rule_ids();

    println!("Rules ({} of {} enabled):\n", enabled.len(), default_rules().len());
    for line in catalog_lines(&enabled) {
        println!("{line}");
    }
    println!("\nRule fan-in timeout: {}ms", config.rules.timeout_ms);
    Ok(())
}

fn catalog_lines(enabled: &[&str]) -> Vec<String> {
    default_rules()
        .iter()
        .map(|rule| {
            let status = if enabled.contains(&rule.id()) { "ON " } else { "OFF" };
            format!("  [{status}] {:<28} {}", rule.id(), rule.description())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_every_rule_in_the_catalog() {
        let lines = catalog_lines(&["habit_adherence"]);
        assert_eq!(lines.len(), 6);
        assert!(lines.iter().any(|l| l.contains("[ON ] habit_adherence")));
        assert!(lines.iter().any(|l| l.contains("[OFF] check_in_missing")));
    }
}
