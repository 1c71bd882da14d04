//! Scripted backend for tests and demo runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;

use super::error::BackendError;
use super::prompts::{build_prompt, PromptMode};
use super::stream::TokenStream;
use super::{InferenceBackend, ProviderId, TaskKind};

/// Lifecycle call observed by a mock backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    Initialize(ProviderId),
    Release(ProviderId),
    Generate(ProviderId),
}

/// Event log shared between several mocks to assert cross-backend ordering.
pub type EventLog = Arc<Mutex<Vec<BackendEvent>>>;

/// How a mock misbehaves.
#[derive(Debug, Clone, Default)]
pub enum MockFailure {
    #[default]
    None,
    /// `initialize` leaves the backend unavailable.
    InitFails(String),
    /// The stream yields `after_tokens` pieces and then an error item.
    GenerateErrors { after_tokens: usize, message: String },
    /// `generate` returns `Err` without producing a stream.
    GenerateRejects(String),
    /// `generate` panics.
    Panics,
    /// `initialize` panics.
    InitPanics,
}

pub struct MockBackend {
    provider: ProviderId,
    tokens: Vec<String>,
    token_delay: Duration,
    jitter: Duration,
    failure: MockFailure,
    release_fails: bool,
    model_size_bytes: u64,
    buffer_size: usize,
    initialized: AtomicBool,
    interrupted: Arc<AtomicBool>,
    events: Option<EventLog>,
    initialize_calls: AtomicUsize,
    release_calls: AtomicUsize,
    generate_calls: AtomicUsize,
    interrupt_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            tokens: ["Hello", ",", " world", "!"].iter().map(|s| s.to_string()).collect(),
            token_delay: Duration::ZERO,
            jitter: Duration::ZERO,
            failure: MockFailure::None,
            release_fails: false,
            model_size_bytes: 512 * 1024 * 1024,
            buffer_size: 16,
            initialized: AtomicBool::new(false),
            interrupted: Arc::new(AtomicBool::new(false)),
            events: None,
            initialize_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
            interrupt_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_token_delay(mut self, delay: Duration) -> Self {
        self.token_delay = delay;
        self
    }

    /// Add up to `jitter` of random extra delay per token.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_failure(mut self, failure: MockFailure) -> Self {
        self.failure = failure;
        self
    }

    pub fn with_release_failure(mut self) -> Self {
        self.release_fails = true;
        self
    }

    pub fn with_model_size(mut self, bytes: u64) -> Self {
        self.model_size_bytes = bytes;
        self
    }

    pub fn with_event_log(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn interrupt_calls(&self) -> usize {
        self.interrupt_calls.load(Ordering::SeqCst)
    }

    fn record(&self, event: BackendEvent) {
        if let Some(events) = &self.events {
            events.lock().push(event);
        }
    }

    fn next_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.token_delay;
        }
        let extra = rand::thread_rng().gen_range(0..=self.jitter.as_micros() as u64);
        self.token_delay + Duration::from_micros(extra)
    }
}

#[async_trait::async_trait]
impl InferenceBackend for MockBackend {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        self.record(BackendEvent::Initialize(self.provider));
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let MockFailure::InitPanics = self.failure {
            panic!("{} mock initialization panicked", self.provider);
        }
        if let MockFailure::InitFails(reason) = &self.failure {
            tracing::warn!(provider = %self.provider, reason = %reason, "mock initialization failed");
            return Ok(());
        }
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn release(&self) -> Result<(), BackendError> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.record(BackendEvent::Release(self.provider));
        let was_initialized = self.initialized.swap(false, Ordering::SeqCst);
        if was_initialized && self.release_fails {
            return Err(BackendError::Generation(format!(
                "{} failed to free native resources",
                self.provider
            )));
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn model_size_bytes(&self) -> u64 {
        if self.is_available() {
            self.model_size_bytes
        } else {
            0
        }
    }

    fn model_name(&self) -> Option<String> {
        Some(format!("mock-{}", self.provider.as_str()))
    }

    async fn generate(
        &self,
        task: TaskKind,
        input: &str,
        mode: PromptMode,
    ) -> Result<TokenStream, BackendError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.record(BackendEvent::Generate(self.provider));

        if !self.is_available() {
            return Ok(TokenStream::sentinel(&format!(
                "{} model not initialized",
                self.provider.display_name()
            )));
        }

        match &self.failure {
            MockFailure::GenerateRejects(message) => {
                return Err(BackendError::Generation(message.clone()));
            }
            MockFailure::Panics => panic!("{} mock generation panicked", self.provider),
            _ => {}
        }

        // Prompt shape is not scripted, but build it so both modes are exercised.
        let prompt = build_prompt(mode, self.provider, task, input);
        tracing::trace!(provider = %self.provider, prompt_len = prompt.len(), "mock generate");

        self.interrupted.store(false, Ordering::SeqCst);
        let (sender, stream) = TokenStream::channel(self.buffer_size);
        let tokens = self.tokens.clone();
        let delays: Vec<Duration> = tokens.iter().map(|_| self.next_delay()).collect();
        let fail_after = match &self.failure {
            MockFailure::GenerateErrors { after_tokens, message } => {
                Some((*after_tokens, message.clone()))
            }
            _ => None,
        };
        let interrupted = self.interrupted.clone();

        tokio::spawn(async move {
            for (index, (token, delay)) in tokens.into_iter().zip(delays).enumerate() {
                if let Some((after, message)) = &fail_after {
                    if index == *after {
                        let _ = sender.fail(BackendError::Generation(message.clone())).await;
                        return;
                    }
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if interrupted.load(Ordering::SeqCst) || sender.send(token).await.is_err() {
                    return;
                }
            }
            if let Some((_, message)) = fail_after {
                let _ = sender.fail(BackendError::Generation(message)).await;
            }
        });

        Ok(stream)
    }

    async fn interrupt(&self) {
        self.interrupt_calls.fetch_add(1, Ordering::SeqCst);
        self.interrupted.store(true, Ordering::SeqCst);
    }
}
