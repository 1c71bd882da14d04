//! Aggregate statistics over benchmark results.

use serde::{Deserialize, Serialize};

use crate::backend::ProviderId;

use super::types::BenchmarkResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkStats {
    pub total_tests: usize,
    pub completed_tests: usize,
    pub failed_tests: usize,
    /// Mean total latency of successful attempts, in ms.
    pub average_latency: f64,
    /// Mean of the per-attempt average memory, in MB.
    pub average_memory_usage: f64,
    pub average_battery_drain: f64,
    /// Provider with the lowest mean latency.
    pub best_provider: Option<ProviderId>,
    /// Provider with the highest mean latency.
    pub worst_provider: Option<ProviderId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub provider: ProviderId,
    pub attempts: usize,
    pub successes: usize,
    pub average_latency_ms: f64,
    pub average_first_token_ms: f64,
    pub average_tokens_per_second: f64,
}

impl ProviderSummary {
    pub fn failures(&self) -> usize {
        self.attempts - self.successes
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Compute cross-provider statistics. Only successful attempts feed the
/// averages; ties between providers go to the one seen first.
pub fn compute_stats(results: &[BenchmarkResult]) -> BenchmarkStats {
    let successes: Vec<&BenchmarkResult> = results.iter().filter(|r| r.success).collect();
    let mut stats = BenchmarkStats {
        total_tests: results.len(),
        completed_tests: successes.len(),
        failed_tests: results.len() - successes.len(),
        ..Default::default()
    };
    if successes.is_empty() {
        return stats;
    }

    stats.average_latency = mean(successes.iter().map(|r| r.latency.total_latency_ms as f64));
    stats.average_memory_usage = mean(successes.iter().map(|r| r.memory.average_memory_mb as f64));
    stats.average_battery_drain = mean(successes.iter().map(|r| f64::from(r.battery.drain)));

    let mut best: Option<(ProviderId, f64)> = None;
    let mut worst: Option<(ProviderId, f64)> = None;
    for summary in provider_summaries(results).iter().filter(|s| s.successes > 0) {
        let latency = summary.average_latency_ms;
        if best.map_or(true, |(_, b)| latency < b) {
            best = Some((summary.provider, latency));
        }
        if worst.map_or(true, |(_, w)| latency > w) {
            worst = Some((summary.provider, latency));
        }
    }
    stats.best_provider = best.map(|(p, _)| p);
    stats.worst_provider = worst.map(|(p, _)| p);
    stats
}

/// Per-provider aggregates in first-encountered order. Latency and
/// throughput means cover successful attempts only.
pub fn provider_summaries(results: &[BenchmarkResult]) -> Vec<ProviderSummary> {
    let mut order: Vec<ProviderId> = Vec::new();
    for r in results {
        if !order.contains(&r.provider) {
            order.push(r.provider);
        }
    }

    order
        .into_iter()
        .map(|provider| {
            let attempts = results.iter().filter(|r| r.provider == provider).count();
            let ok: Vec<&BenchmarkResult> =
                results.iter().filter(|r| r.provider == provider && r.success).collect();
            ProviderSummary {
                provider,
                attempts,
                successes: ok.len(),
                average_latency_ms: mean(ok.iter().map(|r| r.latency.total_latency_ms as f64)),
                average_first_token_ms: mean(ok.iter().map(|r| r.latency.first_token_latency_ms as f64)),
                average_tokens_per_second: mean(ok.iter().map(|r| r.latency.tokens_per_second)),
            }
        })
        .collect()
}
