use serde::{Deserialize, Serialize};

use crate::pricing::ModelPricing;

/// Per-category dollar cost of a single assistant message.
///
/// `total` is always the componentwise sum of the other four fields; it is
/// recomputed whenever [`Usage::apply_pricing`] runs so the two never drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Cost {
    pub input: f64,
    pub output: f64,
    pub cache_read: f64,
    pub cache_write: f64,
    pub total: f64,
}

impl Cost {
    fn recompute_total(&mut self) {
        self.total = self.input + self.output + self.cache_read + self.cache_write;
    }
}

/// Token accounting for one assistant message, updated incrementally as
/// usage deltas arrive on the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_read_tokens: u64,
    pub cache_write_tokens: u64,
    pub total_tokens: u64,
    pub cost: Cost,
}

impl Usage {
    /// Fold a delta reported by the provider into the running total and
    /// recompute `total_tokens` / `cost` from the per-million pricing table.
    ///
    /// Deltas are absolute snapshots (providers resend the running total on
    /// every usage event), not increments, matching the wire behavior this
    /// type is built to decode.
    pub fn merge_delta(&mut self, delta: UsageDelta, pricing: Option<&ModelPricing>) {
        if let Some(v) = delta.input_tokens {
            self.input_tokens = v;
        }
        if let Some(v) = delta.output_tokens {
            self.output_tokens = v;
        }
        if let Some(v) = delta.cache_read_tokens {
            self.cache_read_tokens = v;
        }
        if let Some(v) = delta.cache_write_tokens {
            self.cache_write_tokens = v;
        }
        self.total_tokens = self.input_tokens
            + self.output_tokens
            + self.cache_read_tokens
            + self.cache_write_tokens;

        if let Some(pricing) = pricing {
            self.cost.input = pricing.cost_for(self.input_tokens, pricing.input_per_million);
            self.cost.output = pricing.cost_for(self.output_tokens, pricing.output_per_million);
            self.cost.cache_read =
                pricing.cost_for(self.cache_read_tokens, pricing.cache_read_per_million);
            self.cost.cache_write =
                pricing.cost_for(self.cache_write_tokens, pricing.cache_write_per_million);
        }
        self.cost.recompute_total();
    }
}

/// A sparse usage update as observed on the wire: only the fields the
/// provider actually reported are `Some`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageDelta {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cache_read_tokens: Option<u64>,
    pub cache_write_tokens: Option<u64>,
}
