use std::pin::Pin;
use std::time::Duration;

use crate::chunk::ChatId;
use crate::errors::TransportError;

/// Raw body of one streaming chat response.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// Per-stream tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    /// Overall deadline for the streaming request, unbounded when `None`.
    pub timeout: Option<Duration>,
    /// Capacity of the in-flight chunk channel between the stream task and
    /// the consumer.
    pub buffer_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            buffer_capacity: 128,
        }
    }
}

/// One outgoing user message, addressed to an existing conversation or to
/// a fresh one when `chat_id` is `None`.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub chat_id: Option<ChatId>,
    pub options: StreamOptions,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, chat_id: Option<ChatId>) -> Self {
        Self {
            message: message.into(),
            chat_id,
            options: StreamOptions::default(),
        }
    }
}

/// Connection seam between the streaming pipeline and a concrete backend.
///
/// `open` performs exactly one connection attempt; retries, if any, belong
/// to the caller. The returned stream owns the connection and releases it
/// when dropped.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<ByteStream, TransportError>;
}
