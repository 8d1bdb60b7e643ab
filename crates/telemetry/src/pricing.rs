//! Built-in pricing table for the models the pipeline calls.
//!
//! Prices are in USD per 1 million tokens. Each model has an input, a cached
//! input and an output price. Custom pricing can be added at runtime via
//! TOML config.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-million-token pricing for a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelPricing {
    /// Price per 1M uncached input tokens in USD.
    pub input_per_m: f64,
    /// Price per 1M cached input tokens in USD.
    pub cached_per_m: f64,
    /// Price per 1M output tokens in USD (reasoning tokens bill as output).
    pub output_per_m: f64,
}

impl ModelPricing {
    /// Pricing with cached input billed at the full input rate.
    pub fn new(input_per_m: f64, output_per_m: f64) -> Self {
        Self {
            input_per_m,
            cached_per_m: input_per_m,
            output_per_m,
        }
    }

    pub fn with_cached(mut self, cached_per_m: f64) -> Self {
        self.cached_per_m = cached_per_m;
        self
    }

    /// Compute cost. `cached_tokens` is the cached share of `input_tokens`.
    pub fn cost(&self, input_tokens: u32, cached_tokens: u32, output_tokens: u32) -> f64 {
        let cached = cached_tokens.min(input_tokens);
        let uncached = input_tokens - cached;
        (uncached as f64 * self.input_per_m
            + cached as f64 * self.cached_per_m
            + output_tokens as f64 * self.output_per_m)
            / 1_000_000.0
    }
}

/// Thread-safe pricing table with built-in defaults and custom overrides.
pub struct PricingTable {
    prices: RwLock<HashMap<String, ModelPricing>>,
}

impl PricingTable {
    /// Create a pricing table with built-in model prices.
    pub fn with_defaults() -> Self {
        let mut prices = HashMap::new();

        prices.insert(
            "gpt-4o".into(),
            ModelPricing::new(2.5, 10.0).with_cached(1.25),
        );
        prices.insert(
            "gpt-4o-mini".into(),
            ModelPricing::new(0.15, 0.6).with_cached(0.075),
        );
        prices.insert(
            "gpt-4.1".into(),
            ModelPricing::new(2.0, 8.0).with_cached(0.5),
        );
        prices.insert(
            "gpt-4.1-mini".into(),
            ModelPricing::new(0.4, 1.6).with_cached(0.1),
        );
        prices.insert(
            "gpt-4.1-nano".into(),
            ModelPricing::new(0.1, 0.4).with_cached(0.025),
        );
        prices.insert("o3-mini".into(), ModelPricing::new(1.1, 4.4).with_cached(0.55));
        prices.insert("o4-mini".into(), ModelPricing::new(1.1, 4.4).with_cached(0.275));

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// Create an empty pricing table.
    pub fn empty() -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
        }
    }

    /// Look up pricing for a model. Returns None if not found.
    pub fn get(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap();
        prices.get(model).cloned()
    }

    /// Add or update pricing for a model.
    pub fn set(&self, model: impl Into<String>, pricing: ModelPricing) {
        let mut prices = self.prices.write().unwrap();
        prices.insert(model.into(), pricing);
    }

    /// Compute cost for a model call, returning 0.0 if model is not in table.
    ///
    /// Tries an exact match first, then strips a provider prefix
    /// (`openai/gpt-4o` → `gpt-4o`), then takes the longest key that is a
    /// prefix of the model (`gpt-4o-mini-2024-07-18` → `gpt-4o-mini`).
    pub fn compute_cost(
        &self,
        model: &str,
        input_tokens: u32,
        cached_tokens: u32,
        output_tokens: u32,
    ) -> f64 {
        self.resolve(model)
            .map(|p| p.cost(input_tokens, cached_tokens, output_tokens))
            .unwrap_or(0.0)
    }

    fn resolve(&self, model: &str) -> Option<ModelPricing> {
        let prices = self.prices.read().unwrap();

        if let Some(p) = prices.get(model) {
            return Some(p.clone());
        }

        let model_lower = model.to_lowercase();
        let bare_model = model_lower.rsplit('/').next().unwrap_or(&model_lower);
        if let Some(p) = prices.get(bare_model) {
            return Some(p.clone());
        }

        prices
            .iter()
            .filter(|(key, _)| bare_model.starts_with(&key.to_lowercase()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| p.clone())
    }

    /// List all known model names.
    pub fn models(&self) -> Vec<String> {
        let prices = self.prices.read().unwrap();
        let mut names: Vec<String> = prices.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of models in the pricing table.
    pub fn len(&self) -> usize {
        self.prices.read().unwrap().len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_model_cost() {
        let table = PricingTable::with_defaults();
        // (1000 * 2.5 + 500 * 10.0) / 1M
        let cost = table.compute_cost("gpt-4o", 1000, 0, 500);
        assert!((cost - 0.0075).abs() < 1e-10);
    }

    #[test]
    fn cached_tokens_bill_at_cached_rate() {
        let p = ModelPricing::new(2.0, 8.0).with_cached(0.5);
        // 600 uncached * 2.0 + 400 cached * 0.5
        let c = p.cost(1000, 400, 0);
        assert!((c - 0.0014).abs() < 1e-10);
        // cached can never exceed input
        assert!((p.cost(100, 500, 0) - 0.00005).abs() < 1e-10);
    }

    #[test]
    fn provider_prefix_and_version_suffix_resolve() {
        let table = PricingTable::with_defaults();
        let direct = table.compute_cost("gpt-4o-mini", 1_000_000, 0, 0);
        assert!((table.compute_cost("openai/gpt-4o-mini", 1_000_000, 0, 0) - direct).abs() < 1e-10);
        assert!(
            (table.compute_cost("gpt-4o-mini-2024-07-18", 1_000_000, 0, 0) - direct).abs() < 1e-10
        );
    }

    #[test]
    fn unknown_model_returns_zero() {
        let table = PricingTable::with_defaults();
        assert_eq!(table.compute_cost("unknown/model-xyz", 1000, 0, 500), 0.0);
    }

    #[test]
    fn set_overrides_existing() {
        let table = PricingTable::with_defaults();
        table.set("gpt-4o", ModelPricing::new(5.0, 20.0));
        let cost = table.compute_cost("gpt-4o", 1_000_000, 0, 0);
        assert!((cost - 5.0).abs() < 1e-10);
    }

    #[test]
    fn list_models_sorted() {
        let table = PricingTable::with_defaults();
        let models = table.models();
        assert!(models.contains(&"gpt-4o".to_string()));
        assert!(models.windows(2).all(|w| w[0] <= w[1]));
        assert!(PricingTable::empty().is_empty());
    }
}
