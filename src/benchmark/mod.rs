//! Benchmark module: test cases, sessions, the scheduler that runs them,
//! and statistics over the results.

mod attempt;
pub mod catalog;
mod plan;
mod scheduler;
mod stats;
mod types;

pub use plan::{BenchmarkPlan, PlanError};
pub use scheduler::{BenchmarkScheduler, SchedulerConfig, SchedulerError};
pub use stats::{compute_stats, provider_summaries, BenchmarkStats, ProviderSummary};
pub use types::{
    baseline_deviation, baseline_latency_ms, tokens_per_second, BatteryMetrics, BenchmarkProgress,
    BenchmarkResult, BenchmarkSession, BenchmarkStatus, Category, ExecutionInfo, LatencyMetrics,
    MemoryMetrics, QualityMetrics, TestCase,
};
