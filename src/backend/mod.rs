//! Inference backend module for bench-core.
//!
//! Defines the `InferenceBackend` capability trait, the provider and task
//! identifiers, the uniform `TokenStream` sequence, and the in-repo backend
//! implementations (mock, local model file, platform service).

mod callback;
mod error;
#[cfg(feature = "gguf")]
mod llama;
mod local;
mod mock;
mod model_files;
pub mod prompts;
mod registry;
mod service;
mod stream;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use callback::spawn_callback_stream;
pub use error::BackendError;
#[cfg(feature = "gguf")]
pub use llama::LlamaCppRuntime;
pub use local::{LocalModelBackend, NativeModel, NativeOptions, NativeRuntime};
pub use mock::{BackendEvent, EventLog, MockBackend, MockFailure};
pub use model_files::{
    validate_model_file, DirectoryCatalog, LoadError, ModelCatalog, ModelFile, ModelFormat,
};
pub use prompts::{GenerationParams, PromptMode};
pub use registry::BackendRegistry;
pub use service::{ServiceBackend, ServiceConnector, ServiceSession};
pub use stream::{StreamClosed, TokenItem, TokenSender, TokenStream};

/// Prefix of the single token a backend emits when asked to generate while
/// not initialized.
pub const SENTINEL_PREFIX: &str = "Error: ";

/// Returns true if `token` is a "not ready" sentinel.
pub fn is_sentinel(token: &str) -> bool {
    token.starts_with(SENTINEL_PREFIX)
}

/// Closed set of backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    /// llama.cpp-style native runtime over GGUF files.
    NativeCpp,
    /// TensorFlow-Lite-style interpreter over `.tflite` files.
    LiteRuntime,
    /// Platform AI service bound over IPC.
    OnDeviceService,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [
        ProviderId::NativeCpp,
        ProviderId::LiteRuntime,
        ProviderId::OnDeviceService,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::NativeCpp => "Llama.cpp",
            Self::LiteRuntime => "LiteRT (TensorFlow Lite)",
            Self::OnDeviceService => "Gemini Nano (on-device service)",
        }
    }

    /// Stable machine name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NativeCpp => "native_cpp",
            Self::LiteRuntime => "lite_runtime",
            Self::OnDeviceService => "on_device_service",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderId {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "native_cpp" | "llama_cpp" | "llamacpp" => Ok(Self::NativeCpp),
            "lite_runtime" | "litert" | "tflite" => Ok(Self::LiteRuntime),
            "on_device_service" | "gemini_nano" | "service" => Ok(Self::OnDeviceService),
            other => Err(BackendError::UnknownProvider(other.to_string())),
        }
    }
}

/// What a generation request asks the model to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Chat,
    Summarize,
    Proofread,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Summarize => "summarize",
            Self::Proofread => "proofread",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability contract shared by every provider implementation.
///
/// A backend owns its native resources exclusively. Callers serialize
/// generation: at most one `generate` stream is consumed at a time.
///
/// - `initialize` is idempotent. A model that cannot be loaded leaves the
///   backend unavailable and still returns `Ok`; `Err` is reserved for
///   faults in the backend machinery itself.
/// - `release` on an uninitialized backend is a no-op.
/// - `generate` on an uninitialized backend yields exactly one sentinel
///   token (`"Error: <reason>"`) and completes.
#[async_trait::async_trait]
pub trait InferenceBackend: Send + Sync {
    fn provider(&self) -> ProviderId;

    async fn initialize(&self) -> Result<(), BackendError>;

    async fn release(&self) -> Result<(), BackendError>;

    fn is_available(&self) -> bool;

    /// Size of the loaded model in bytes (0 when nothing is loaded).
    fn model_size_bytes(&self) -> u64;

    fn model_name(&self) -> Option<String> {
        None
    }

    async fn generate(
        &self,
        task: TaskKind,
        input: &str,
        mode: PromptMode,
    ) -> Result<TokenStream, BackendError>;

    /// Best-effort stop of an in-flight generation.
    async fn interrupt(&self) {}
}
