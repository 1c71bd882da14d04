//! Span utilities for benchmark tracing.

use tracing::{info_span, Span};

use crate::backend::ProviderId;

/// Fills the outcome fields declared by `AttemptSpan`.
pub trait SpanExt {
    /// `status = "ok"` plus the measured latency and token count.
    fn record_success(&self, latency_ms: u64, tokens_generated: usize);

    /// `status = "error"` with the failure message.
    fn record_failure(&self, message: &str);
}

impl SpanExt for Span {
    fn record_success(&self, latency_ms: u64, tokens_generated: usize) {
        self.record("status", "ok");
        self.record("latency_ms", latency_ms);
        self.record("tokens_generated", tokens_generated as u64);
    }

    fn record_failure(&self, message: &str) {
        self.record("status", "error");
        self.record("error.message", message);
    }
}

/// Factory for the span wrapping one (test case, provider) attempt.
pub struct AttemptSpan;

impl AttemptSpan {
    /// Fields:
    /// - `session_id`, `test_case_id`, `provider`: attempt identity
    /// - `status`, `latency_ms`, `tokens_generated`: `SpanExt::record_success`
    /// - `error.message`: `SpanExt::record_failure`
    pub fn new(session_id: &str, test_case_id: &str, provider: ProviderId) -> Span {
        info_span!(
            "benchmark_attempt",
            session_id = %session_id,
            test_case_id = %test_case_id,
            provider = provider.as_str(),
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            tokens_generated = tracing::field::Empty,
        )
    }
}
