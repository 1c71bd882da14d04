//! Bridge from callback-style native generation to `TokenStream`.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::error::BackendError;
use super::stream::TokenStream;

/// Run a callback-driven generator on a blocking thread and expose its
/// output as a `TokenStream`.
///
/// `generate` receives an `on_token` callback; it must stop producing once
/// the callback returns `false` (the consumer dropped the stream). An `Err`
/// return or a panic inside `generate` becomes the stream's final item, so
/// the consumer always sees a terminal outcome.
pub fn spawn_callback_stream<F>(buffer_size: usize, generate: F) -> TokenStream
where
    F: FnOnce(&mut dyn FnMut(&str) -> bool) -> Result<(), BackendError> + Send + 'static,
{
    let (sender, stream) = TokenStream::channel(buffer_size);
    tokio::task::spawn_blocking(move || {
        let mut on_token = |piece: &str| sender.blocking_send(piece).is_ok();
        let outcome = catch_unwind(AssertUnwindSafe(|| generate(&mut on_token)));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(BackendError::Generation(
                "native generation panicked".into(),
            )),
        };
        if let Some(error) = failure {
            if sender.blocking_fail(error).is_err() {
                tracing::debug!("generation failed after consumer went away");
            }
        }
    });
    stream
}
