use serde::{Deserialize, Serialize};

/// Dollars-per-million-token pricing for a single model, as published by a
/// provider or model registry. Mirrors the shape of the OpenRouter pricing
/// feed but keyed by per-million rather than per-token so it reads naturally
/// next to list prices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
    #[serde(default)]
    pub cache_read_per_million: f64,
    #[serde(default)]
    pub cache_write_per_million: f64,
}

impl ModelPricing {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
            cache_read_per_million: 0.0,
            cache_write_per_million: 0.0,
        }
    }

    pub fn with_cache_pricing(
        mut self,
        cache_read_per_million: f64,
        cache_write_per_million: f64,
    ) -> Self {
        self.cache_read_per_million = cache_read_per_million;
        self.cache_write_per_million = cache_write_per_million;
        self
    }

    pub(crate) fn cost_for(&self, tokens: u64, per_million: f64) -> f64 {
        (tokens as f64) * per_million / 1_000_000.0
    }
}
