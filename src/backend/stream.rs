//! Token streaming output for incremental responses.
//!
//! Every backend hands out a `TokenStream` regardless of how it produces
//! text internally. Producers push into a bounded channel; dropping the
//! stream closes the channel, which is the producer's signal to stop.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;

use super::error::BackendError;
use super::SENTINEL_PREFIX;

/// One unit of generated text, or the fault that ended generation.
pub type TokenItem = Result<String, BackendError>;

/// Async stream of generated text pieces.
#[derive(Debug)]
pub struct TokenStream {
    receiver: mpsc::Receiver<TokenItem>,
}

impl TokenStream {
    /// Create a new token stream with sender/receiver pair.
    pub fn channel(buffer_size: usize) -> (TokenSender, Self) {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        (TokenSender { sender }, Self { receiver })
    }

    /// A stream that yields the given pieces and completes.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let (sender, receiver) = mpsc::channel(tokens.len().max(1));
        for token in tokens {
            // Capacity covers every item.
            let _ = sender.try_send(Ok(token));
        }
        Self { receiver }
    }

    /// The single-token "not ready" answer.
    pub fn sentinel(reason: &str) -> Self {
        Self::from_tokens([format!("{SENTINEL_PREFIX}{reason}")])
    }

    /// A stream whose only item is `error`.
    pub fn failed(error: BackendError) -> Self {
        let (sender, receiver) = mpsc::channel(1);
        let _ = sender.try_send(Err(error));
        Self { receiver }
    }

    /// Receive the next item, if any.
    pub async fn recv(&mut self) -> Option<TokenItem> {
        self.receiver.recv().await
    }

    /// Concatenate all remaining pieces, stopping at the first error.
    pub async fn collect_text(mut self) -> Result<String, BackendError> {
        let mut text = String::new();
        while let Some(item) = self.recv().await {
            text.push_str(&item?);
        }
        Ok(text)
    }
}

impl Stream for TokenStream {
    type Item = TokenItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Sender half for pushing pieces to a stream.
#[derive(Clone)]
pub struct TokenSender {
    sender: mpsc::Sender<TokenItem>,
}

impl TokenSender {
    /// Send a piece to the stream.
    pub async fn send(&self, token: impl Into<String>) -> Result<(), StreamClosed> {
        self.sender
            .send(Ok(token.into()))
            .await
            .map_err(|_| StreamClosed)
    }

    /// Terminate the stream with an error.
    pub async fn fail(&self, error: BackendError) -> Result<(), StreamClosed> {
        self.sender.send(Err(error)).await.map_err(|_| StreamClosed)
    }

    /// Send from a non-async thread (native callbacks).
    pub fn blocking_send(&self, token: impl Into<String>) -> Result<(), StreamClosed> {
        self.sender
            .blocking_send(Ok(token.into()))
            .map_err(|_| StreamClosed)
    }

    pub fn blocking_fail(&self, error: BackendError) -> Result<(), StreamClosed> {
        self.sender.blocking_send(Err(error)).map_err(|_| StreamClosed)
    }

    /// True once the consumer dropped its stream.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Close the stream by dropping the sender.
    pub fn close(self) {
        drop(self.sender);
    }
}

#[derive(Debug, Error)]
#[error("token stream closed")]
pub struct StreamClosed;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_from_tokens_yields_in_order() {
        let stream = TokenStream::from_tokens(["a", "b", "c"]);
        let pieces: Vec<String> = stream.map(|item| item.unwrap()).collect().await;
        assert_eq!(pieces, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_sentinel_is_single_token() {
        let mut stream = TokenStream::sentinel("model not initialized");
        let first = stream.recv().await.unwrap().unwrap();
        assert_eq!(first, "Error: model not initialized");
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_collect_text_stops_at_error() {
        let (sender, stream) = TokenStream::channel(4);
        sender.send("partial").await.unwrap();
        sender
            .fail(BackendError::Generation("boom".into()))
            .await
            .unwrap();
        drop(sender);

        let err = stream.collect_text().await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_stream_pending_until_token_sent() {
        let (sender, stream) = TokenStream::channel(2);
        let mut stream = tokio_test::task::spawn(stream);
        tokio_test::assert_pending!(stream.poll_next());

        sender.blocking_send("tok").unwrap();
        assert!(stream.is_woken());
        let item = tokio_test::assert_ready!(stream.poll_next());
        assert_eq!(item.unwrap().unwrap(), "tok");

        sender.close();
        assert!(tokio_test::assert_ready!(stream.poll_next()).is_none());
    }

    #[tokio::test]
    async fn test_dropping_stream_closes_sender() {
        let (sender, stream) = TokenStream::channel(1);
        assert!(!sender.is_closed());
        drop(stream);
        assert!(sender.is_closed());
        assert!(sender.send("late").await.is_err());
    }
}
