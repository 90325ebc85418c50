//! Per-model token statistics across a session.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::types::usage::{Cost, Usage};

/// Accumulated usage for one model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub usage: Usage,
    pub requests: u64,
}

impl ModelUsage {
    pub fn billable_input_tokens(&self) -> u32 {
        self.usage.billable_input_tokens()
    }
}

/// Snapshot of everything recorded so far.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenSummary {
    pub total: Usage,
    pub requests: u64,
    pub by_model: BTreeMap<String, ModelUsage>,
}

/// Tracks token usage per model. Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct TokenStatistics {
    inner: Arc<RwLock<BTreeMap<String, ModelUsage>>>,
}

impl std::fmt::Debug for TokenStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStatistics")
            .field("summary", &self.summary())
            .finish()
    }
}

impl TokenStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the usage of one request against `model`.
    pub fn record(&self, model: &str, usage: &Usage) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let entry = inner.entry(model.to_string()).or_default();
        entry.usage.merge(usage);
        entry.requests += 1;
    }

    pub fn model(&self, model: &str) -> Option<ModelUsage> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .cloned()
    }

    pub fn summary(&self) -> TokenSummary {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut summary = TokenSummary {
            by_model: inner.clone(),
            ..Default::default()
        };
        for model in inner.values() {
            summary.total.merge(&model.usage);
            summary.requests += model.requests;
        }
        summary
    }

    /// Estimate total cost with one price table for every model.
    pub fn estimated_cost(&self, input_price_per_m: f64, output_price_per_m: f64) -> Cost {
        Cost::from_usage(&self.summary().total, input_price_per_m, output_price_per_m)
    }

    pub fn reset(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_usage_per_model() {
        let stats = TokenStatistics::new();
        stats.record("alpha", &Usage::new(100, 20));
        stats.record("alpha", &Usage::new(50, 10));
        stats.record("beta", &Usage::new(5, 5));

        let summary = stats.summary();
        assert_eq!(summary.requests, 3);
        assert_eq!(summary.total.total_tokens, 190);
        assert_eq!(summary.by_model["alpha"].usage.input_tokens, 150);
        assert_eq!(summary.by_model["alpha"].requests, 2);
        assert_eq!(stats.model("beta").map(|m| m.usage.output_tokens), Some(5));
    }

    #[test]
    fn cached_tokens_are_not_billable() {
        let stats = TokenStatistics::new();
        let mut usage = Usage::new(1_000_000, 0);
        usage.cache_read_tokens = Some(400_000);
        stats.record("alpha", &usage);

        assert_eq!(stats.model("alpha").unwrap().billable_input_tokens(), 600_000);
        let cost = stats.estimated_cost(1.0, 2.0);
        assert!((cost.total_cost - 0.6).abs() < 1e-9);
    }

    #[test]
    fn clones_share_state() {
        let stats = TokenStatistics::new();
        let clone = stats.clone();
        clone.record("alpha", &Usage::new(1, 1));
        assert_eq!(stats.summary().requests, 1);
        stats.reset();
        assert_eq!(clone.summary().requests, 0);
    }
}
