//! Provider orchestration.
//!
//! Tracks the "current provider" and guarantees at most one initialized
//! backend: switching always releases the previous backend before the new
//! one is initialized. Activation is the only writer and runs under a single
//! async mutex, so concurrent `activate` calls never interleave.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::backend::{
    BackendError, BackendRegistry, InferenceBackend, PromptMode, ProviderId, TaskKind, TokenStream,
};
use crate::telemetry;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("No backend registered for provider {0}")]
    NoActiveBackend(ProviderId),

    #[error("Active provider changed to {current} before generating for {expected}")]
    ProviderChanged { expected: ProviderId, current: ProviderId },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Read-only view of the persisted provider preferences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub provider: ProviderId,
    pub gpu_enabled: bool,
    pub model_id: Option<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self { provider: ProviderId::NativeCpp, gpu_enabled: false, model_id: None }
    }
}

struct ActiveState {
    current: ProviderId,
    /// Whether `current` has been activated and reported available.
    available: bool,
}

pub struct ProviderOrchestrator {
    registry: BackendRegistry,
    state: Mutex<ActiveState>,
    default_mode: PromptMode,
}

impl ProviderOrchestrator {
    /// Create an orchestrator. Nothing is initialized until `activate`.
    pub fn new(registry: BackendRegistry, initial: ProviderId) -> Self {
        Self {
            registry,
            state: Mutex::new(ActiveState { current: initial, available: false }),
            default_mode: PromptMode::default(),
        }
    }

    pub fn with_default_mode(mut self, mode: PromptMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn default_mode(&self) -> PromptMode {
        self.default_mode
    }

    /// Make `provider` the active backend and report whether it is available.
    ///
    /// A no-op when `provider` is already current and available. Otherwise the
    /// current backend is released (errors are logged and ignored), `current`
    /// moves to `provider`, and the new backend is initialized. `current`
    /// moves even when the new backend ends up unavailable.
    pub async fn activate(&self, provider: ProviderId) -> Result<bool, OrchestratorError> {
        let mut state = self.state.lock().await;

        if state.current == provider && state.available {
            if let Some(backend) = self.registry.get(provider) {
                if backend.is_available() {
                    return Ok(true);
                }
            }
        }

        let started = Instant::now();
        if let Some(previous) = self.registry.get(state.current) {
            if let Err(e) = previous.release().await {
                tracing::warn!(provider = %state.current, error = %e, "release failed, continuing");
            }
        }

        state.current = provider;
        state.available = false;

        let Some(backend) = self.registry.get(provider) else {
            tracing::warn!(provider = %provider, "no backend registered");
            telemetry::record_activation(provider, false, started.elapsed());
            return Ok(false);
        };

        if let Err(e) = backend.initialize().await {
            if e.is_fault() {
                tracing::error!(provider = %provider, error = %e, "backend initialization fault");
            } else {
                tracing::warn!(provider = %provider, error = %e, "backend initialization failed");
            }
            telemetry::record_activation(provider, false, started.elapsed());
            return Err(e.into());
        }

        state.available = backend.is_available();
        telemetry::record_activation(provider, state.available, started.elapsed());
        tracing::info!(
            provider = %provider,
            available = state.available,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "provider activated"
        );
        Ok(state.available)
    }

    async fn active_backend(&self) -> Result<Arc<dyn InferenceBackend>, OrchestratorError> {
        let current = self.state.lock().await.current;
        self.registry
            .get(current)
            .ok_or(OrchestratorError::NoActiveBackend(current))
    }

    /// Delegate a generation to the active backend.
    pub async fn generate(
        &self,
        task: TaskKind,
        text: &str,
        mode: PromptMode,
    ) -> Result<TokenStream, OrchestratorError> {
        let backend = self.active_backend().await?;
        Ok(backend.generate(task, text, mode).await?)
    }

    /// Generate on `provider` only if it is still the active provider.
    ///
    /// The activation lock is held until the backend hands back its stream,
    /// so a concurrent `activate` cannot swap backends in between.
    pub async fn generate_for(
        &self,
        provider: ProviderId,
        task: TaskKind,
        text: &str,
        mode: PromptMode,
    ) -> Result<TokenStream, OrchestratorError> {
        let state = self.state.lock().await;
        if state.current != provider {
            return Err(OrchestratorError::ProviderChanged { expected: provider, current: state.current });
        }
        let backend = self
            .registry
            .get(provider)
            .ok_or(OrchestratorError::NoActiveBackend(provider))?;
        let stream = backend.generate(task, text, mode).await?;
        drop(state);
        Ok(stream)
    }

    pub async fn generate_chat(&self, text: &str) -> Result<TokenStream, OrchestratorError> {
        self.generate(TaskKind::Chat, text, self.default_mode).await
    }

    pub async fn generate_summary(&self, text: &str) -> Result<TokenStream, OrchestratorError> {
        self.generate(TaskKind::Summarize, text, self.default_mode).await
    }

    pub async fn generate_proofread(&self, text: &str) -> Result<TokenStream, OrchestratorError> {
        self.generate(TaskKind::Proofread, text, self.default_mode).await
    }

    pub async fn current_provider(&self) -> ProviderId {
        self.state.lock().await.current
    }

    pub async fn current_provider_name(&self) -> &'static str {
        self.current_provider().await.display_name()
    }

    /// Model size of the active backend, 0 when nothing is loaded.
    pub async fn current_model_size_bytes(&self) -> u64 {
        self.active_backend()
            .await
            .map_or(0, |backend| backend.model_size_bytes())
    }

    pub async fn current_model_name(&self) -> Option<String> {
        self.active_backend().await.ok().and_then(|b| b.model_name())
    }

    pub async fn is_available(&self) -> bool {
        self.active_backend()
            .await
            .map_or(false, |backend| backend.is_available())
    }

    /// Release the active backend; the next `activate` re-initializes it.
    pub async fn release_current(&self) {
        let mut state = self.state.lock().await;
        if let Some(backend) = self.registry.get(state.current) {
            if let Err(e) = backend.release().await {
                tracing::warn!(provider = %state.current, error = %e, "release failed");
            }
        }
        state.available = false;
    }

    /// Best-effort stop of an in-flight generation on the active backend.
    ///
    /// Does not take the activation lock, so it can run while an activation
    /// is pending.
    pub async fn interrupt_current(&self) {
        let current = match self.state.try_lock() {
            Ok(state) => Some(state.current),
            Err(_) => None,
        };
        let backends: Vec<Arc<dyn InferenceBackend>> = match current {
            Some(provider) => self.registry.get(provider).into_iter().collect(),
            None => self
                .registry
                .providers()
                .into_iter()
                .filter_map(|p| self.registry.get(p))
                .collect(),
        };
        for backend in backends {
            backend.interrupt().await;
        }
    }

    /// Follow the settings stream, activating the selected provider on
    /// every change. The task ends when the sender is dropped.
    pub fn follow_settings(
        self: Arc<Self>,
        mut settings: watch::Receiver<ProviderSettings>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut last = None;
            loop {
                let selected = settings.borrow_and_update().provider;
                if last != Some(selected) {
                    last = Some(selected);
                    match self.activate(selected).await {
                        Ok(available) => {
                            tracing::debug!(provider = %selected, available, "settings applied");
                        }
                        Err(e) => {
                            tracing::warn!(provider = %selected, error = %e, "settings activation failed");
                        }
                    }
                }
                if settings.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}
