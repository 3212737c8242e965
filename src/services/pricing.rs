//! Model-aware cost accounting with per-model pricing.
//!
//! Costs derive from the vendor-reported usage of each request: input,
//! output, cache reads, and cache writes split by TTL bucket. Batch
//! submissions are billed at half price.

use crate::domain::models::TokenUsage;

/// Pricing per million tokens for a specific model (USD).
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    /// 5-minute-TTL cache write.
    pub cache_write_5m: f64,
    /// 1-hour-TTL cache write.
    pub cache_write_1h: f64,
}

/// Known model pricing table (USD per million tokens).
const PRICING_TABLE: &[(&str, ModelPricing)] = &[
    (
        "opus",
        ModelPricing {
            input: 15.0,
            output: 75.0,
            cache_read: 1.5,
            cache_write_5m: 18.75,
            cache_write_1h: 30.0,
        },
    ),
    (
        "sonnet",
        ModelPricing {
            input: 3.0,
            output: 15.0,
            cache_read: 0.3,
            cache_write_5m: 3.75,
            cache_write_1h: 6.0,
        },
    ),
    (
        "haiku",
        ModelPricing {
            input: 0.80,
            output: 4.0,
            cache_read: 0.08,
            cache_write_5m: 1.0,
            cache_write_1h: 1.6,
        },
    ),
];

/// Applied when no table entry matches the model id.
const DEFAULT_PRICING: ModelPricing = ModelPricing {
    input: 3.0,
    output: 15.0,
    cache_read: 0.3,
    cache_write_5m: 3.75,
    cache_write_1h: 6.0,
};

/// Discount multiplier for batch-submitted requests.
const BATCH_MULTIPLIER: f64 = 0.5;

/// Look up pricing by model name or alias substring (e.g. "sonnet"
/// matches "claude-sonnet-4-5-20250929"). Unknown models get the default
/// entry.
pub fn model_pricing(model: &str) -> ModelPricing {
    let model_lower = model.to_lowercase();
    PRICING_TABLE
        .iter()
        .find(|(name, _)| model_lower.contains(name))
        .map(|(_, pricing)| *pricing)
        .unwrap_or(DEFAULT_PRICING)
}

/// Cost in USD for one request.
pub fn compute_cost(model: &str, usage: &TokenUsage, batch: bool) -> f64 {
    let pricing = model_pricing(model);
    let cost = (usage.input_tokens as f64 * pricing.input
        + usage.output_tokens as f64 * pricing.output
        + usage.cache_read_input_tokens as f64 * pricing.cache_read
        + usage.cache_write_5m() as f64 * pricing.cache_write_5m
        + usage.cache_write_1h() as f64 * pricing.cache_write_1h)
        / 1_000_000.0;
    if batch {
        cost * BATCH_MULTIPLIER
    } else {
        cost
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CacheCreation;

    fn usage() -> TokenUsage {
        TokenUsage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            cache_read_input_tokens: 1_000_000,
            cache_creation_input_tokens: 2_000_000,
            cache_creation: Some(CacheCreation {
                ephemeral_5m_input_tokens: 1_000_000,
                ephemeral_1h_input_tokens: 1_000_000,
            }),
        }
    }

    #[test]
    fn test_pricing_lookup_by_substring() {
        let pricing = model_pricing("claude-sonnet-4-5-20250929");
        assert!((pricing.input - 3.0).abs() < f64::EPSILON);
        let pricing = model_pricing("claude-opus-4-6");
        assert!((pricing.output - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_model_uses_default() {
        let pricing = model_pricing("some-future-model");
        assert!((pricing.input - DEFAULT_PRICING.input).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compute_cost_sums_all_buckets() {
        // sonnet: 3 + 15 + 0.3 + 3.75 + 6 per million each
        let cost = compute_cost("claude-sonnet-4-5", &usage(), false);
        assert!((cost - (3.0 + 15.0 + 0.3 + 3.75 + 6.0)).abs() < 1e-9);
    }

    #[test]
    fn test_batch_halves_cost() {
        let full = compute_cost("claude-sonnet-4-5", &usage(), false);
        let batched = compute_cost("claude-sonnet-4-5", &usage(), true);
        assert!((batched - full * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_unsplit_cache_creation_billed_at_5m() {
        let usage = TokenUsage {
            cache_creation_input_tokens: 1_000_000,
            ..Default::default()
        };
        let cost = compute_cost("claude-haiku-4-5", &usage, false);
        assert!((cost - 1.0).abs() < 1e-9);
    }
}
