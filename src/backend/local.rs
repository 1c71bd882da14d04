//! File-backed backend for providers that load a local model file.
//!
//! The native runtime itself is pluggable (`NativeRuntime`); this module
//! handles model discovery, validation, blocking-thread loading and the
//! callback-to-stream bridge.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::callback::spawn_callback_stream;
use super::error::BackendError;
use super::model_files::{validate_model_file, LoadError, ModelCatalog, ModelFile, ModelFormat};
use super::prompts::{build_prompt, GenerationParams, PromptMode};
use super::stream::TokenStream;
use super::{InferenceBackend, ProviderId, TaskKind};

/// Options handed to a native runtime at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeOptions {
    pub context_size: u32,
    /// 0 lets the runtime pick.
    pub threads: usize,
    pub gpu_enabled: bool,
}

impl Default for NativeOptions {
    fn default() -> Self {
        Self { context_size: 2048, threads: 0, gpu_enabled: false }
    }
}

/// Loads model files into native models.
pub trait NativeRuntime: Send + Sync {
    fn load(&self, path: &Path, options: &NativeOptions) -> Result<Box<dyn NativeModel>, BackendError>;
}

/// A loaded native model.
///
/// `generate` runs synchronously on a blocking thread and must stop once
/// `on_token` returns `false`.
pub trait NativeModel: Send {
    fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        on_token: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), BackendError>;

    /// Native memory held by the model, in bytes.
    fn memory_usage_bytes(&self) -> u64 {
        0
    }
}

/// Shared with generation threads; `release` empties it under the lock.
type ModelSlot = Arc<Mutex<Option<Box<dyn NativeModel>>>>;

struct LoadedModel {
    file: ModelFile,
    size_bytes: u64,
    model: ModelSlot,
}

pub struct LocalModelBackend {
    provider: ProviderId,
    format: ModelFormat,
    catalog: Arc<dyn ModelCatalog>,
    runtime: Arc<dyn NativeRuntime>,
    options: NativeOptions,
    buffer_size: usize,
    loaded: Mutex<Option<LoadedModel>>,
    interrupted: Arc<AtomicBool>,
}

impl LocalModelBackend {
    /// Build a backend for a file-loading provider.
    ///
    /// Fails with `UnknownProvider` for providers that do not load files.
    pub fn new(
        provider: ProviderId,
        catalog: Arc<dyn ModelCatalog>,
        runtime: Arc<dyn NativeRuntime>,
        options: NativeOptions,
    ) -> Result<Self, BackendError> {
        let format = ModelFormat::for_provider(provider).ok_or_else(|| {
            BackendError::UnknownProvider(format!("{} does not load model files", provider.as_str()))
        })?;
        Ok(Self {
            provider,
            format,
            catalog,
            runtime,
            options,
            buffer_size: 64,
            loaded: Mutex::new(None),
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Pick the first downloaded model that passes validation.
    fn select_model(&self) -> Result<(ModelFile, u64), LoadError> {
        let mut last_error = None;
        for file in self.catalog.models_for(self.provider).into_iter().filter(|m| m.downloaded) {
            match validate_model_file(&file.path, self.format) {
                Ok(size) => return Ok((file, size)),
                Err(e) => {
                    tracing::warn!(
                        provider = %self.provider,
                        model = %file.id,
                        error = %e,
                        "skipping unusable model file"
                    );
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(LoadError::NoModel(self.provider)))
    }
}

#[async_trait::async_trait]
impl InferenceBackend for LocalModelBackend {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        if self.loaded.lock().is_some() {
            return Ok(());
        }

        let (file, size_bytes) = match self.select_model() {
            Ok(selected) => selected,
            Err(e) => {
                tracing::warn!(provider = %self.provider, error = %e, "no loadable model");
                return Ok(());
            }
        };

        let runtime = self.runtime.clone();
        let options = self.options;
        let path = file.path.clone();
        let loaded = tokio::task::spawn_blocking(move || runtime.load(&path, &options))
            .await
            .map_err(|e| BackendError::InitFailure(format!("model load task failed: {e}")))?;

        match loaded {
            Ok(model) => {
                tracing::info!(
                    provider = %self.provider,
                    model = %file.id,
                    size_bytes,
                    "model loaded"
                );
                *self.loaded.lock() = Some(LoadedModel {
                    file,
                    size_bytes,
                    model: Arc::new(Mutex::new(Some(model))),
                });
            }
            Err(e) => {
                tracing::warn!(provider = %self.provider, model = %file.id, error = %e, "model load failed");
            }
        }
        Ok(())
    }

    async fn release(&self) -> Result<(), BackendError> {
        let released = self.loaded.lock().take();
        let Some(loaded) = released else {
            return Ok(());
        };
        self.interrupted.store(true, Ordering::SeqCst);

        // Waits out an in-flight decode step holding the model lock.
        let slot = loaded.model.clone();
        tokio::task::spawn_blocking(move || drop(slot.lock().take()))
            .await
            .map_err(|e| BackendError::Generation(format!("model release task failed: {e}")))?;
        tracing::info!(provider = %self.provider, model = %loaded.file.id, "model released");
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.loaded.lock().is_some()
    }

    fn model_size_bytes(&self) -> u64 {
        self.loaded.lock().as_ref().map_or(0, |l| {
            let native = l
                .model
                .try_lock()
                .and_then(|m| m.as_ref().map(|m| m.memory_usage_bytes()))
                .unwrap_or(0);
            l.size_bytes.max(native)
        })
    }

    fn model_name(&self) -> Option<String> {
        self.loaded.lock().as_ref().map(|l| l.file.id.clone())
    }

    async fn generate(
        &self,
        task: TaskKind,
        input: &str,
        mode: PromptMode,
    ) -> Result<TokenStream, BackendError> {
        let model = match self.loaded.lock().as_ref() {
            Some(loaded) => loaded.model.clone(),
            None => {
                return Ok(TokenStream::sentinel(&format!(
                    "{} model not initialized",
                    self.provider.display_name()
                )));
            }
        };

        let prompt = build_prompt(mode, self.provider, task, input);
        let params = GenerationParams::for_task(task);
        self.interrupted.store(false, Ordering::SeqCst);
        let interrupted = self.interrupted.clone();

        Ok(spawn_callback_stream(self.buffer_size, move |on_token| {
            let mut slot = model.lock();
            let Some(model) = slot.as_mut() else {
                return Err(BackendError::Unavailable("model released before generation".into()));
            };
            let mut guarded = |piece: &str| !interrupted.load(Ordering::SeqCst) && on_token(piece);
            model.generate(&prompt, &params, &mut guarded)
        }))
    }

    async fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}
