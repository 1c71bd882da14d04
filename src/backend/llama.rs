//! llama-cpp-2 runtime for GGUF models.

use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use parking_lot::Mutex;

use super::error::BackendError;
use super::local::{NativeModel, NativeOptions, NativeRuntime};
use super::prompts::GenerationParams;

const GPU_LAYERS: u32 = 99;
const REPEAT_PENALTY: f32 = 1.1;
const SAMPLER_SEED: u32 = 42;

/// `NativeRuntime` over llama.cpp. The llama backend can only be
/// initialized once per process, so the runtime keeps it for every model.
#[derive(Default)]
pub struct LlamaCppRuntime {
    backend: Mutex<Option<Arc<LlamaBackend>>>,
}

impl LlamaCppRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn backend(&self) -> Result<Arc<LlamaBackend>, BackendError> {
        let mut slot = self.backend.lock();
        if let Some(backend) = slot.as_ref() {
            return Ok(backend.clone());
        }
        let backend = Arc::new(
            LlamaBackend::init().map_err(|e| BackendError::InitFailure(format!("backend init: {e}")))?,
        );
        *slot = Some(backend.clone());
        Ok(backend)
    }
}

impl NativeRuntime for LlamaCppRuntime {
    fn load(&self, path: &Path, options: &NativeOptions) -> Result<Box<dyn NativeModel>, BackendError> {
        let backend = self.backend()?;
        let gpu_layers = if options.gpu_enabled { GPU_LAYERS } else { 0 };
        let model_params = LlamaModelParams::default().with_n_gpu_layers(gpu_layers);
        let model = LlamaModel::load_from_file(&backend, path, &model_params)
            .map_err(|e| BackendError::InitFailure(format!("load: {e}")))?;
        Ok(Box::new(LlamaCppModel {
            model,
            backend,
            n_ctx: options.context_size,
            n_threads: resolve_threads(options.threads),
        }))
    }
}

struct LlamaCppModel {
    // Dropped before the backend it was loaded with.
    model: LlamaModel,
    backend: Arc<LlamaBackend>,
    n_ctx: u32,
    n_threads: i32,
}

// SAFETY: LlamaModel and LlamaBackend are Send+Sync in llama-cpp-2, and
// the model is only touched behind `LocalModelBackend`'s mutex.
unsafe impl Send for LlamaCppModel {}

impl LlamaCppModel {
    fn tokenize(&self, text: &str) -> Result<Vec<LlamaToken>, BackendError> {
        self.model
            .str_to_token(text, AddBos::Always)
            .map_err(|e| BackendError::Generation(format!("tokenize: {e}")))
    }

    fn create_context(&self) -> Result<LlamaContext<'_>, BackendError> {
        let p = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.n_ctx))
            .with_n_threads(self.n_threads)
            .with_n_threads_batch(self.n_threads);
        self.model
            .new_context(&self.backend, p)
            .map_err(|e| BackendError::Generation(format!("ctx: {e}")))
    }
}

impl NativeModel for LlamaCppModel {
    fn generate(
        &mut self,
        prompt: &str,
        params: &GenerationParams,
        on_token: &mut dyn FnMut(&str) -> bool,
    ) -> Result<(), BackendError> {
        let tokens = self.tokenize(prompt)?;
        if tokens.is_empty() {
            return Ok(());
        }
        let mut ctx = self.create_context()?;
        let mut batch = LlamaBatch::new(tokens.len(), 1);
        add_seq(&mut batch, &tokens)?;
        decode(&mut ctx, &mut batch)?;

        let mut sampler = build_sampler(params);
        sampler.accept_many(tokens.iter().copied());
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let mut pos = tokens.len() as i32;

        for _ in 0..params.max_tokens {
            // -1 samples from the last token that had logits computed
            let tok = sampler.sample(&ctx, -1);
            sampler.accept(tok);
            if self.model.is_eog_token(tok) {
                break;
            }
            let piece = self
                .model
                .token_to_piece(tok, &mut decoder, false, None)
                .map_err(|e| BackendError::Generation(format!("detok: {e}")))?;
            if !on_token(&piece) {
                break;
            }
            batch.clear();
            batch
                .add(tok, pos, &[0], true)
                .map_err(|e| BackendError::Generation(format!("batch: {e}")))?;
            decode(&mut ctx, &mut batch)?;
            pos += 1;
        }
        Ok(())
    }

    fn memory_usage_bytes(&self) -> u64 {
        self.model.size()
    }
}

fn add_seq(batch: &mut LlamaBatch, tokens: &[LlamaToken]) -> Result<(), BackendError> {
    let last = tokens.len().saturating_sub(1);
    for (i, &tok) in tokens.iter().enumerate() {
        batch
            .add(tok, i as i32, &[0], i == last)
            .map_err(|e| BackendError::Generation(format!("batch: {e}")))?;
    }
    Ok(())
}

fn decode(ctx: &mut LlamaContext<'_>, batch: &mut LlamaBatch) -> Result<(), BackendError> {
    ctx.decode(batch)
        .map_err(|e| BackendError::Generation(format!("decode: {e}")))
}

fn build_sampler(params: &GenerationParams) -> LlamaSampler {
    LlamaSampler::chain_simple([
        LlamaSampler::penalties(64, REPEAT_PENALTY, 0.0, 0.0),
        LlamaSampler::top_p(params.top_p, 1),
        LlamaSampler::temp(params.temperature),
        LlamaSampler::dist(SAMPLER_SEED),
    ])
}

fn resolve_threads(n: usize) -> i32 {
    let threads = if n == 0 {
        // Cap at 16; more threads stop helping on memory-bound decode.
        num_cpus::get().clamp(1, 16)
    } else {
        n
    };
    i32::try_from(threads).unwrap_or(4)
}
