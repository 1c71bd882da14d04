//! Backend bound to a platform AI service.
//!
//! Binding and IPC belong to the `ServiceConnector`; this backend only
//! tracks the session and turns its pushes into a `TokenStream`.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::error::BackendError;
use super::prompts::{build_prompt, GenerationParams, PromptMode};
use super::stream::{TokenSender, TokenStream};
use super::{InferenceBackend, ProviderId, TaskKind};

/// Establishes a session with the platform service.
#[async_trait::async_trait]
pub trait ServiceConnector: Send + Sync {
    /// Bind the service. `Unavailable` means the device does not offer it.
    async fn bind(&self) -> Result<Arc<dyn ServiceSession>, BackendError>;
}

/// A bound service session.
#[async_trait::async_trait]
pub trait ServiceSession: Send + Sync {
    /// Push the response into `sink` and return when it is complete.
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationParams,
        sink: TokenSender,
    ) -> Result<(), BackendError>;

    async fn close(&self);

    fn model_name(&self) -> Option<String> {
        None
    }
}

pub struct ServiceBackend {
    connector: Arc<dyn ServiceConnector>,
    buffer_size: usize,
    session: Mutex<Option<Arc<dyn ServiceSession>>>,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl ServiceBackend {
    pub fn new(connector: Arc<dyn ServiceConnector>) -> Self {
        Self {
            connector,
            buffer_size: 64,
            session: Mutex::new(None),
            in_flight: Mutex::new(None),
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    fn cancel_in_flight(&self) {
        if let Some(token) = self.in_flight.lock().take() {
            token.cancel();
        }
    }
}

#[async_trait::async_trait]
impl InferenceBackend for ServiceBackend {
    fn provider(&self) -> ProviderId {
        ProviderId::OnDeviceService
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        if self.session.lock().is_some() {
            return Ok(());
        }
        match self.connector.bind().await {
            Ok(session) => {
                tracing::info!(provider = %ProviderId::OnDeviceService, "service bound");
                *self.session.lock() = Some(session);
            }
            Err(e) => {
                tracing::warn!(provider = %ProviderId::OnDeviceService, error = %e, "service bind failed");
            }
        }
        Ok(())
    }

    async fn release(&self) -> Result<(), BackendError> {
        self.cancel_in_flight();
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close().await;
            tracing::info!(provider = %ProviderId::OnDeviceService, "service unbound");
        }
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.session.lock().is_some()
    }

    // The service owns its model; nothing is resident in this process.
    fn model_size_bytes(&self) -> u64 {
        0
    }

    fn model_name(&self) -> Option<String> {
        self.session.lock().as_ref().and_then(|s| s.model_name())
    }

    async fn generate(
        &self,
        task: TaskKind,
        input: &str,
        mode: PromptMode,
    ) -> Result<TokenStream, BackendError> {
        let session = self.session.lock().clone();
        let Some(session) = session else {
            return Ok(TokenStream::sentinel(&format!(
                "{} model not initialized",
                ProviderId::OnDeviceService.display_name()
            )));
        };

        let prompt = build_prompt(mode, ProviderId::OnDeviceService, task, input);
        let params = GenerationParams::for_task(task);
        let cancel = CancellationToken::new();
        if let Some(previous) = self.in_flight.lock().replace(cancel.clone()) {
            previous.cancel();
        }

        let (sender, stream) = TokenStream::channel(self.buffer_size);
        tokio::spawn(async move {
            let failure_sink = sender.clone();
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!("service generation interrupted");
                    let interrupted = BackendError::Generation("interrupted".into());
                    if failure_sink.fail(interrupted).await.is_err() {
                        tracing::debug!("interrupted stream already dropped");
                    }
                }
                outcome = session.generate(&prompt, &params, sender) => {
                    if let Err(e) = outcome {
                        let _ = failure_sink.fail(e).await;
                    }
                }
            }
        });
        Ok(stream)
    }

    async fn interrupt(&self) {
        self.cancel_in_flight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct FakeSession {
        closed: AtomicBool,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl ServiceSession for FakeSession {
        async fn generate(
            &self,
            prompt: &str,
            _params: &GenerationParams,
            sink: TokenSender,
        ) -> Result<(), BackendError> {
            if self.fail {
                return Err(BackendError::Service("quota exceeded".into()));
            }
            for word in prompt.split_whitespace() {
                if sink.send(word).await.is_err() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn model_name(&self) -> Option<String> {
            Some("nano-v2".into())
        }
    }

    struct FakeConnector {
        session: Option<Arc<FakeSession>>,
    }

    #[async_trait::async_trait]
    impl ServiceConnector for FakeConnector {
        async fn bind(&self) -> Result<Arc<dyn ServiceSession>, BackendError> {
            match &self.session {
                Some(session) => Ok(session.clone()),
                None => Err(BackendError::Unavailable("service not installed".into())),
            }
        }
    }

    fn session(fail: bool) -> Arc<FakeSession> {
        Arc::new(FakeSession { closed: AtomicBool::new(false), fail })
    }

    #[tokio::test]
    async fn test_bind_failure_leaves_unavailable() {
        let backend = ServiceBackend::new(Arc::new(FakeConnector { session: None }));
        assert!(backend.initialize().await.is_ok());
        assert!(!backend.is_available());
    }

    #[tokio::test]
    async fn test_generate_and_release() {
        let fake = session(false);
        let backend = ServiceBackend::new(Arc::new(FakeConnector { session: Some(fake.clone()) }));
        backend.initialize().await.unwrap();
        assert_eq!(backend.model_name().as_deref(), Some("nano-v2"));

        let text = backend
            .generate(TaskKind::Chat, "a b c", PromptMode::Unified)
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "abc");

        backend.release().await.unwrap();
        assert!(fake.closed.load(Ordering::SeqCst));
        assert!(!backend.is_available());
    }

    #[tokio::test]
    async fn test_service_error_becomes_stream_error() {
        let backend = ServiceBackend::new(Arc::new(FakeConnector { session: Some(session(true)) }));
        backend.initialize().await.unwrap();
        let err = backend
            .generate(TaskKind::Proofread, "teh cat", PromptMode::Unified)
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap_err();
        assert!(err.is_fault());
    }

    #[tokio::test]
    async fn test_interrupt_ends_stream() {
        let backend = ServiceBackend::new(Arc::new(FakeConnector { session: Some(session(false)) }));
        backend.initialize().await.unwrap();
        let long_input = "word ".repeat(500);
        let mut stream = backend
            .generate(TaskKind::Chat, &long_input, PromptMode::Unified)
            .await
            .unwrap();
        assert!(stream.recv().await.is_some());
        backend.interrupt().await;

        let mut remaining = 0;
        let mut last = None;
        while let Some(item) = stream.recv().await {
            remaining += 1;
            last = Some(item);
        }
        assert!(remaining < 499);
        let err = last.unwrap().unwrap_err();
        assert!(err.to_string().contains("interrupted"));
    }
}
