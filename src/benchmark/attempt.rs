//! One measured (test case, provider) attempt.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::backend::prompts::estimate_token_count;
use crate::backend::{is_sentinel, GenerationParams, PromptMode, ProviderId};
use crate::orchestrator::ProviderOrchestrator;
use crate::sampler::{DeviceInfo, MetricsSampler, SampleSnapshot};
use crate::telemetry::{self, AttemptSpan, SpanExt};

use super::types::{
    BatteryMetrics, BenchmarkResult, ExecutionInfo, LatencyMetrics, MemoryMetrics, QualityMetrics,
    TestCase,
};

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Everything an attempt borrows from the running session.
pub(crate) struct AttemptContext<'a> {
    pub orchestrator: &'a ProviderOrchestrator,
    pub sampler: &'a MetricsSampler,
    pub device: &'a DeviceInfo,
    pub session_id: &'a str,
    pub prompt_mode: PromptMode,
    pub cancel: &'a CancellationToken,
}

pub(crate) enum AttemptOutcome {
    Finished(Box<BenchmarkResult>),
    /// Cancellation interrupted the attempt; nothing is recorded.
    Cancelled,
}

struct Generated {
    text: String,
    tokens: usize,
    first_token_ms: u64,
}

/// Run one attempt. Every failure inside becomes a failed result; only
/// cancellation yields no result.
pub(crate) async fn run_attempt(
    ctx: &AttemptContext<'_>,
    test_case: &TestCase,
    provider: ProviderId,
) -> AttemptOutcome {
    let span = AttemptSpan::new(ctx.session_id, &test_case.id, provider);
    async {
        let started_at = Utc::now();
        let memory_before = ctx.sampler.current_memory_bytes();

        // Not raced against cancellation; release/initialize always run to the end.
        let activation = AssertUnwindSafe(ctx.orchestrator.activate(provider))
            .catch_unwind()
            .await;
        if ctx.cancel.is_cancelled() {
            return AttemptOutcome::Cancelled;
        }
        let activation = match activation {
            Ok(activation) => activation,
            Err(panic) => {
                let message = format!(
                    "backend panicked during activation: {}",
                    panic_message(panic.as_ref())
                );
                return finish_failed(ctx, test_case, provider, started_at, message).await;
            }
        };
        match activation {
            Ok(true) => {}
            Ok(false) => {
                let message = format!("{} is not available", provider.display_name());
                return finish_failed(ctx, test_case, provider, started_at, message).await;
            }
            Err(e) => {
                return finish_failed(ctx, test_case, provider, started_at, e.to_string()).await;
            }
        }
        let activation_delta = ctx.sampler.current_memory_bytes() as i64 - memory_before as i64;

        ctx.sampler.start().await;
        let start = Instant::now();
        let generation = AssertUnwindSafe(generate(ctx, test_case, provider, start)).catch_unwind();
        let outcome = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => None,
            outcome = generation => Some(outcome),
        };
        let total_ms = start.elapsed().as_millis() as u64;

        let Some(outcome) = outcome else {
            ctx.sampler.cancel().await;
            tracing::info!("attempt cancelled");
            return AttemptOutcome::Cancelled;
        };
        let snapshot = ctx.sampler.stop().await;

        let generated = match outcome {
            Ok(Ok(generated)) => generated,
            Ok(Err(message)) => {
                return finish_failed(ctx, test_case, provider, started_at, message).await;
            }
            Err(panic) => {
                let message = format!("backend panicked: {}", panic_message(panic.as_ref()));
                return finish_failed(ctx, test_case, provider, started_at, message).await;
            }
        };

        let result = success_result(
            ctx,
            test_case,
            provider,
            started_at,
            total_ms,
            activation_delta,
            &snapshot,
            generated,
        )
        .await;

        tracing::Span::current()
            .record_success(result.latency.total_latency_ms, result.latency.total_tokens);
        telemetry::record_attempt_success(provider, total_ms, result.latency.total_tokens);
        tracing::info!(
            tokens = result.latency.total_tokens,
            tokens_per_second = result.latency.tokens_per_second,
            "attempt finished"
        );
        AttemptOutcome::Finished(Box::new(result))
    }
    .instrument(span)
    .await
}

/// Request generation and drain the stream, timing the first piece.
async fn generate(
    ctx: &AttemptContext<'_>,
    test_case: &TestCase,
    provider: ProviderId,
    start: Instant,
) -> Result<Generated, String> {
    let mut stream = ctx
        .orchestrator
        .generate_for(provider, test_case.task, &test_case.input_text, ctx.prompt_mode)
        .await
        .map_err(|e| e.to_string())?;

    let mut text = String::new();
    let mut tokens = 0usize;
    let mut first_token_ms = None;
    while let Some(item) = stream.recv().await {
        let piece = item.map_err(|e| e.to_string())?;
        if first_token_ms.is_none() && !piece.is_empty() {
            first_token_ms = Some(start.elapsed().as_millis() as u64);
        }
        tokens += 1;
        text.push_str(&piece);
    }

    // A lone sentinel means the backend was not ready.
    if tokens == 1 && is_sentinel(&text) {
        return Err(text);
    }
    // The backend was swapped out while this stream was being drained.
    let current = ctx.orchestrator.current_provider().await;
    if current != provider {
        return Err(format!("Active provider changed to {current} during generation"));
    }
    Ok(Generated { text, tokens, first_token_ms: first_token_ms.unwrap_or(0) })
}

#[allow(clippy::too_many_arguments)]
async fn success_result(
    ctx: &AttemptContext<'_>,
    test_case: &TestCase,
    provider: ProviderId,
    started_at: DateTime<Utc>,
    total_ms: u64,
    activation_delta: i64,
    snapshot: &SampleSnapshot,
    generated: Generated,
) -> BenchmarkResult {
    let latency = LatencyMetrics::measured(
        test_case.task,
        generated.first_token_ms,
        total_ms,
        generated.tokens,
        estimate_token_count(&test_case.input_text),
    );
    let memory = MemoryMetrics {
        model_size_mb: ctx.orchestrator.current_model_size_bytes().await as f32 / BYTES_PER_MB as f32,
        peak_memory_mb: snapshot.peak_mb(),
        average_memory_mb: snapshot.average_mb(),
        memory_increase_mb: (activation_delta / BYTES_PER_MB as i64).max(snapshot.delta_mb()),
        available_memory_mb: ctx.sampler.available_memory_bytes() / BYTES_PER_MB,
        total_memory_mb: ctx.device.total_ram_mb(),
    };
    let quality = QualityMetrics {
        output_length: generated.text.chars().count(),
        output_tokens: generated.tokens,
        task_accomplished: !generated.text.is_empty(),
    };

    BenchmarkResult {
        id: uuid::Uuid::new_v4().to_string(),
        provider,
        test_case_id: test_case.id.clone(),
        model_name: ctx.orchestrator.current_model_name().await,
        timestamp: started_at,
        latency,
        memory,
        battery: BatteryMetrics::from_snapshot(snapshot),
        quality,
        device: ctx.device.clone(),
        execution: execution_info(ctx, test_case, provider, started_at),
        generated_text: generated.text,
        success: true,
        error_message: None,
    }
}

async fn finish_failed(
    ctx: &AttemptContext<'_>,
    test_case: &TestCase,
    provider: ProviderId,
    started_at: DateTime<Utc>,
    message: String,
) -> AttemptOutcome {
    tracing::Span::current().record_failure(&message);
    telemetry::record_attempt_failure(provider, failure_reason(&message));
    tracing::warn!(error = %message, "attempt failed");

    let result = BenchmarkResult {
        id: uuid::Uuid::new_v4().to_string(),
        provider,
        test_case_id: test_case.id.clone(),
        model_name: ctx.orchestrator.current_model_name().await,
        timestamp: started_at,
        latency: LatencyMetrics::default(),
        memory: MemoryMetrics::default(),
        battery: BatteryMetrics::default(),
        quality: QualityMetrics::default(),
        device: ctx.device.clone(),
        execution: execution_info(ctx, test_case, provider, started_at),
        generated_text: String::new(),
        success: false,
        error_message: Some(message),
    };
    AttemptOutcome::Finished(Box::new(result))
}

fn execution_info(
    ctx: &AttemptContext<'_>,
    test_case: &TestCase,
    provider: ProviderId,
    started_at: DateTime<Utc>,
) -> ExecutionInfo {
    let params = GenerationParams::for_task(test_case.task);
    let configuration = BTreeMap::from([
        ("provider".to_string(), provider.as_str().to_string()),
        ("task".to_string(), test_case.task.as_str().to_string()),
        ("prompt_mode".to_string(), ctx.prompt_mode.as_str().to_string()),
        ("max_tokens".to_string(), params.max_tokens.to_string()),
        ("temperature".to_string(), params.temperature.to_string()),
        ("top_p".to_string(), params.top_p.to_string()),
    ]);
    ExecutionInfo {
        start_time: started_at,
        end_time: Utc::now(),
        provider_version: Some(provider.as_str().to_string()),
        prompt_mode: ctx.prompt_mode,
        configuration,
    }
}

fn failure_reason(message: &str) -> &'static str {
    if message.starts_with("backend panicked") {
        "panic"
    } else if message.ends_with("is not available") || is_sentinel(message) {
        "unavailable"
    } else {
        "generation"
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
