//! bench-core
//!
//! On-device LLM provider orchestration and benchmarking.
//!
//! - **backend**: the `InferenceBackend` capability and its implementations
//!   (native model files, platform service, scripted mock)
//! - **orchestrator**: selects the active provider; at most one backend is
//!   initialized at any time
//! - **benchmark**: sessions over a (test case x provider) matrix, the
//!   scheduler that runs them, and statistics over the results
//! - **sampler**: memory and battery sampling during an attempt
//!
//! `BenchRuntime` wires these together.

pub mod backend;
pub mod benchmark;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod sampler;
pub mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use backend::{BackendRegistry, MockBackend, ProviderId};
use benchmark::{BenchmarkScheduler, SchedulerConfig};
use config::EnvConfig;
use orchestrator::ProviderOrchestrator;
use sampler::{DeviceProbe, MetricsSampler, SamplerConfig, SystemProbe};

/// Wiring of orchestrator, sampler and scheduler.
pub struct BenchRuntime {
    pub orchestrator: Arc<ProviderOrchestrator>,
    pub sampler: Arc<MetricsSampler>,
    pub scheduler: BenchmarkScheduler,
}

impl BenchRuntime {
    /// Build a runtime over `registry` reading the host through `SystemProbe`.
    pub fn new(registry: BackendRegistry, config: &EnvConfig) -> Self {
        Self::with_probe(registry, Arc::new(SystemProbe::new()), config)
    }

    pub fn with_probe(registry: BackendRegistry, probe: Arc<dyn DeviceProbe>, config: &EnvConfig) -> Self {
        Self::from_parts(
            registry,
            probe,
            config.prompt_mode,
            config.sampler.clone(),
            config.scheduler.clone(),
        )
    }

    pub fn from_parts(
        registry: BackendRegistry,
        probe: Arc<dyn DeviceProbe>,
        default_mode: backend::PromptMode,
        sampler: SamplerConfig,
        scheduler: SchedulerConfig,
    ) -> Self {
        let initial = registry.providers().first().copied().unwrap_or(ProviderId::NativeCpp);
        let orchestrator =
            Arc::new(ProviderOrchestrator::new(registry, initial).with_default_mode(default_mode));
        let sampler = Arc::new(MetricsSampler::new(probe, sampler));
        let scheduler = BenchmarkScheduler::new(orchestrator.clone(), sampler.clone(), scheduler);
        Self { orchestrator, sampler, scheduler }
    }
}

/// Mock backends for every provider, paced like small on-device models.
pub fn demo_registry() -> BackendRegistry {
    let paced = |provider, delay_ms: u64, size_mb: u64| {
        Arc::new(
            MockBackend::new(provider)
                .with_tokens(
                    "On-device models trade a little quality for privacy and zero network latency ."
                        .split_inclusive(' ')
                        .map(str::to_string)
                        .collect::<Vec<_>>(),
                )
                .with_token_delay(Duration::from_millis(delay_ms))
                .with_jitter(Duration::from_millis(delay_ms / 2))
                .with_model_size(size_mb * 1024 * 1024),
        )
    };
    BackendRegistry::new()
        .with(paced(ProviderId::NativeCpp, 30, 1400))
        .with(paced(ProviderId::LiteRuntime, 20, 900))
        .with(paced(ProviderId::OnDeviceService, 12, 0))
}

/// Registry with the llama.cpp backend for `NativeCpp` over the configured
/// model directory; the other providers stay on the demo mocks.
#[cfg(feature = "gguf")]
pub fn local_registry(config: &EnvConfig) -> Result<BackendRegistry, backend::BackendError> {
    let catalog = Arc::new(backend::DirectoryCatalog::new(config.model_dir.clone()));
    let native = backend::LocalModelBackend::new(
        ProviderId::NativeCpp,
        catalog,
        Arc::new(backend::LlamaCppRuntime::new()),
        config.native,
    )?
    .with_buffer_size(config.stream_buffer);
    let mut registry = demo_registry();
    registry.register(Arc::new(native));
    Ok(registry)
}
