//! Metric emission through the `metrics` facade.
//!
//! No recorder is installed by this crate; embedders that want the numbers
//! install one (Prometheus, statsd, ...) before starting a session.

use std::time::Duration;

use metrics::{counter, histogram};

use crate::backend::ProviderId;

pub fn record_attempt_success(provider: ProviderId, latency_ms: u64, tokens: usize) {
    let provider = provider.as_str();
    counter!("bench_attempts_total", "provider" => provider, "status" => "success").increment(1);
    histogram!("bench_attempt_latency_ms", "provider" => provider).record(latency_ms as f64);
    counter!("bench_tokens_generated_total", "provider" => provider).increment(tokens as u64);
}

pub fn record_attempt_failure(provider: ProviderId, reason: &str) {
    counter!(
        "bench_attempts_total",
        "provider" => provider.as_str(),
        "status" => "failure",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record an activation and how long release + initialize took.
pub fn record_activation(provider: ProviderId, available: bool, elapsed: Duration) {
    let provider = provider.as_str();
    let outcome = if available { "available" } else { "unavailable" };
    counter!("bench_activations_total", "provider" => provider, "outcome" => outcome).increment(1);
    histogram!("bench_activation_duration_ms", "provider" => provider)
        .record(elapsed.as_secs_f64() * 1000.0);
}
