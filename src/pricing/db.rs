use std::collections::HashMap;

use crate::core::Stats;
use crate::error::AppError;

use super::types::ModelPricing;

const DEFAULT_MODEL: &str = "default";
const TOKENS_PER_MILLION: f64 = 1_000_000.0;

const BUILTIN_PRICING: &[(&str, ModelPricing)] = &[
    (DEFAULT_MODEL, ModelPricing::new(3.0, 15.0, 3.75, 0.30)),
    ("claude-opus-4-5-20251101", ModelPricing::new(5.0, 25.0, 6.25, 0.50)),
    // Opus 4.1 keeps the legacy rates
    ("claude-opus-4-1-20250805", ModelPricing::new(15.0, 75.0, 18.75, 1.50)),
    ("claude-sonnet-4-20250514", ModelPricing::new(3.0, 15.0, 3.75, 0.30)),
    ("claude-sonnet-4-5-20250514", ModelPricing::new(3.0, 15.0, 3.75, 0.30)),
    ("claude-sonnet-4-5-20250929", ModelPricing::new(3.0, 15.0, 3.75, 0.30)),
    ("claude-haiku-3-5-20241022", ModelPricing::new(0.80, 4.0, 1.0, 0.08)),
    ("claude-haiku-4-5-20251001", ModelPricing::new(1.0, 5.0, 1.25, 0.10)),
    ("haiku", ModelPricing::new(1.0, 5.0, 1.25, 0.10)),
    ("sonnet", ModelPricing::new(3.0, 15.0, 3.75, 0.30)),
];

/// Per-model rates, built once per run and passed to the renderers
#[derive(Debug, Clone)]
pub(crate) struct PricingTable {
    models: HashMap<String, ModelPricing>,
}

impl Default for PricingTable {
    fn default() -> Self {
        Self {
            models: BUILTIN_PRICING
                .iter()
                .map(|(name, pricing)| (name.to_string(), *pricing))
                .collect(),
        }
    }
}

impl PricingTable {
    /// Built-in rates with config overrides layered on top
    pub(crate) fn with_overrides(
        overrides: &HashMap<String, ModelPricing>,
    ) -> Result<Self, AppError> {
        let mut table = Self::default();
        for (model, pricing) in overrides {
            if !pricing.is_valid() {
                return Err(AppError::InvalidPricing {
                    model: model.clone(),
                });
            }
            table.models.insert(model.clone(), *pricing);
        }
        Ok(table)
    }

    /// Rates for `model`; unknown or unpriced models use the default entry
    pub(crate) fn get_pricing(&self, model: &str) -> ModelPricing {
        self.models
            .get(model)
            .filter(|pricing| pricing.is_priced())
            .or_else(|| self.models.get(DEFAULT_MODEL))
            .copied()
            .unwrap_or_default()
    }
}

pub(crate) fn calculate_cost(stats: &Stats, model: &str, pricing: &PricingTable) -> f64 {
    let rates = pricing.get_pricing(model);
    (stats.input_tokens as f64 * rates.input
        + stats.output_tokens as f64 * rates.output
        + stats.cache_creation as f64 * rates.cache_write
        + stats.cache_read as f64 * rates.cache_read)
        / TOKENS_PER_MILLION
}

/// Sum total cost across model breakdown map.
pub(crate) fn sum_model_costs(models: &HashMap<String, Stats>, pricing: &PricingTable) -> f64 {
    models
        .iter()
        .map(|(model, stats)| calculate_cost(stats, model, pricing))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(input: i64, output: i64, cache_creation: i64, cache_read: i64) -> Stats {
        Stats {
            input_tokens: input,
            output_tokens: output,
            cache_creation,
            cache_read,
            count: 1,
        }
    }

    #[test]
    fn calculate_cost_basic() {
        let table = PricingTable::default();
        let cost = calculate_cost(&stats(1_000_000, 100_000, 0, 0), "claude-sonnet-4-20250514", &table);
        // 1M * $3/M + 100K * $15/M = $3 + $1.5 = $4.5
        assert!((cost - 4.5).abs() < 1e-9);
    }

    #[test]
    fn calculate_cost_with_cache() {
        let table = PricingTable::default();
        let cost = calculate_cost(&stats(0, 0, 1_000_000, 1_000_000), "sonnet", &table);
        // 1M * $3.75/M + 1M * $0.3/M
        assert!((cost - 4.05).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_uses_default() {
        let table = PricingTable::default();
        assert_eq!(
            table.get_pricing("some-future-model"),
            table.get_pricing(DEFAULT_MODEL)
        );
        let opus = table.get_pricing("claude-opus-4-1-20250805");
        assert_eq!(opus.output, 75.0);
    }

    #[test]
    fn zero_rate_override_falls_back_to_default() {
        let overrides = HashMap::from([(
            "free-model".to_string(),
            ModelPricing::new(0.0, 0.0, 1.0, 1.0),
        )]);
        let table = PricingTable::with_overrides(&overrides).unwrap();
        assert_eq!(table.get_pricing("free-model").input, 3.0);
    }

    #[test]
    fn overrides_replace_builtins() {
        let overrides = HashMap::from([(
            "sonnet".to_string(),
            ModelPricing::new(2.0, 10.0, 2.5, 0.2),
        )]);
        let table = PricingTable::with_overrides(&overrides).unwrap();
        let cost = calculate_cost(&stats(1_000_000, 0, 0, 0), "sonnet", &table);
        assert!((cost - 2.0).abs() < 1e-9);
    }

    #[test]
    fn negative_override_is_rejected() {
        let overrides = HashMap::from([(
            "sonnet".to_string(),
            ModelPricing::new(-1.0, 10.0, 0.0, 0.0),
        )]);
        let err = PricingTable::with_overrides(&overrides).unwrap_err();
        assert!(err.to_string().contains("sonnet"));
    }

    #[test]
    fn sum_model_costs_adds_each_model() {
        let table = PricingTable::default();
        let models = HashMap::from([
            ("sonnet".to_string(), stats(1_000_000, 0, 0, 0)),
            ("haiku".to_string(), stats(1_000_000, 0, 0, 0)),
        ]);
        assert!((sum_model_costs(&models, &table) - 4.0).abs() < 1e-9);
    }
}
