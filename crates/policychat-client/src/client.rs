use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::debug;

use crate::chunk::{ChatId, StreamChunk};
use crate::conversation::{ConversationState, SessionUpdate, reduce};
use crate::decode::ChunkDecoder;
use crate::errors::{ClientError, DecodeError, DispatchError};
use crate::session::{SessionSink, TurnGuard};
use crate::transport::{ChatRequest, ChatTransport, StreamOptions};

/// Handle used to request cancellation of an in-flight reply.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation.
    ///
    /// Cancellation is cooperative: the stream task observes it between
    /// deliveries, releases the connection, and reports
    /// `ClientError::Cancelled` as the turn outcome.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Client for streaming policy-chat replies.
///
/// This is the main user-facing API: open a raw chunk stream with
/// [`stream_reply`](ChatClient::stream_reply), or drive a whole turn into
/// conversation state with [`send`](ChatClient::send).
#[derive(Clone)]
pub struct ChatClient {
    transport: Arc<dyn ChatTransport>,
    options: StreamOptions,
}

impl ChatClient {
    /// Creates a client over the given transport with default options.
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            options: StreamOptions::default(),
        }
    }

    /// Starts a builder for configuring a client.
    pub fn builder() -> ChatClientBuilder {
        ChatClientBuilder::default()
    }

    /// Builds a request carrying this client's configured options.
    pub fn request(&self, message: impl Into<String>, chat_id: Option<ChatId>) -> ChatRequest {
        ChatRequest {
            message: message.into(),
            chat_id,
            options: self.options.clone(),
        }
    }

    /// Validates the request and opens a streaming reply.
    ///
    /// The returned `ChatStream` yields chunks in arrival order, one at a
    /// time, and ends after the terminal chunk. Each call opens exactly one
    /// connection; nothing is retried. The request is streamed with exactly
    /// the options it carries; use [`request`](ChatClient::request) to build
    /// one with the client's configured options.
    pub async fn stream_reply(&self, request: ChatRequest) -> Result<ChatStream, ClientError> {
        if request.message.trim().is_empty() {
            return Err(ClientError::Validation("message must not be empty".into()));
        }
        if request.options.buffer_capacity == 0 {
            return Err(ClientError::Validation(
                "stream buffer capacity must be greater than 0".into(),
            ));
        }

        let (tx, rx) = mpsc::channel(request.options.buffer_capacity);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let cancel = CancelHandle { tx: cancel_tx };
        tokio::spawn(stream_task(
            self.transport.clone(),
            request,
            tx,
            outcome_tx,
            cancel_rx,
        ));

        Ok(ChatStream {
            rx,
            outcome_rx,
            cancel,
            saw_terminal: false,
        })
    }

    /// Sends one user message and folds the whole reply into `state`.
    ///
    /// The target conversation is captured from `state.chat_id` before the
    /// stream opens; chunks arriving after the state switched elsewhere are
    /// discarded. A failed turn leaves whatever content already streamed in
    /// place and clears the typing flag.
    pub async fn send(
        &self,
        content: impl Into<String>,
        state: &mut ConversationState,
        sessions: &mut dyn SessionSink,
    ) -> Result<(), ClientError> {
        let content = content.into();
        let mut guard = TurnGuard::capture(state.chat_id);
        let request = self.request(content.clone(), state.chat_id);

        let mut stream = self.stream_reply(request).await?;
        state.push_user(content);
        while let Some(chunk) = stream.next_chunk().await {
            apply_chunk(state, &mut guard, &chunk, sessions);
        }

        let outcome = stream.finish().await;
        if outcome.is_err() && guard.admits(state.chat_id) {
            state.typing = false;
        }
        outcome
    }

    /// Runs one turn to completion and returns the concatenated reply text.
    ///
    /// An in-band assistant failure becomes `ClientError::Assistant`.
    pub async fn collect_reply(
        &self,
        message: impl Into<String>,
        chat_id: Option<ChatId>,
    ) -> Result<String, ClientError> {
        let mut stream = self.stream_reply(self.request(message, chat_id)).await?;
        let mut reply = String::new();
        while let Some(chunk) = stream.next_chunk().await {
            match chunk {
                StreamChunk::TextDelta { delta } => reply.push_str(&delta),
                StreamChunk::Error { message } => {
                    stream.finish().await?;
                    return Err(ClientError::Assistant(message));
                }
                _ => {}
            }
        }
        stream.finish().await?;
        Ok(reply)
    }
}

/// Builder used to configure a `ChatClient`.
///
/// The configured options are carried by every request the client builds
/// itself (`send`, `collect_reply`, and [`request`](ChatClient::request));
/// a `ChatRequest` assembled by hand keeps its own options.
#[derive(Default)]
pub struct ChatClientBuilder {
    transport: Option<Arc<dyn ChatTransport>>,
    options: StreamOptions,
}

impl ChatClientBuilder {
    /// Sets the transport replies are streamed over.
    pub fn transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets an optional per-turn timeout.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// Sets the bounded chunk buffer size used between the stream task and
    /// the consumer.
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.options.buffer_capacity = capacity;
        self
    }

    /// Builds the client and validates its configuration.
    pub fn build(self) -> Result<ChatClient, ClientError> {
        let transport = self.transport.ok_or_else(|| {
            ClientError::Config("a chat transport is required to build a client".into())
        })?;
        if self.options.buffer_capacity == 0 {
            return Err(ClientError::Config(
                "stream buffer capacity must be greater than 0".into(),
            ));
        }
        Ok(ChatClient {
            transport,
            options: self.options,
        })
    }
}

/// Streaming handle returned by `ChatClient::stream_reply`.
///
/// Use `next_chunk()` to consume chunks as they arrive and `finish()` to
/// obtain the turn outcome after the stream ends.
pub struct ChatStream {
    rx: mpsc::Receiver<StreamChunk>,
    outcome_rx: oneshot::Receiver<Result<(), ClientError>>,
    cancel: CancelHandle,
    saw_terminal: bool,
}

impl ChatStream {
    /// Returns a handle that can cancel the turn.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Waits for and returns the next chunk.
    ///
    /// Returns `None` after the stream ends, whether by a terminal chunk,
    /// a clean close, or a failure; `finish()` tells them apart.
    pub async fn next_chunk(&mut self) -> Option<StreamChunk> {
        let chunk = self.rx.recv().await;
        if let Some(chunk) = &chunk
            && chunk.ends_turn()
        {
            self.saw_terminal = true;
        }
        chunk
    }

    /// Drains the stream (if needed) and returns the turn outcome.
    ///
    /// This is safe to call after consuming chunks manually with
    /// `next_chunk()`.
    pub async fn finish(mut self) -> Result<(), ClientError> {
        while !self.saw_terminal {
            match self.rx.recv().await {
                Some(chunk) if chunk.ends_turn() => self.saw_terminal = true,
                Some(_) => {}
                None => break,
            }
        }

        match self.outcome_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(ClientError::protocol_msg(
                "stream task ended without reporting an outcome",
            )),
        }
    }
}

async fn stream_task(
    transport: Arc<dyn ChatTransport>,
    request: ChatRequest,
    tx: mpsc::Sender<StreamChunk>,
    outcome_tx: oneshot::Sender<Result<(), ClientError>>,
    mut cancel_rx: watch::Receiver<bool>,
) {
    let mut body = match transport.open(&request).await {
        Ok(body) => body,
        Err(err) => {
            let _ = outcome_tx.send(Err(err.into()));
            return;
        }
    };

    let mut decoder = ChunkDecoder::default();
    let mut delivered = 0_u64;
    loop {
        tokio::select! {
            changed = cancel_rx.changed() => {
                match changed {
                    Ok(_) if *cancel_rx.borrow() => {
                        debug!(chat_id = ?request.chat_id, "chat stream cancelled");
                        let _ = outcome_tx.send(Err(ClientError::Cancelled));
                        return;
                    }
                    Ok(_) => {}
                    // `changed()` fails only once every `CancelHandle` is
                    // gone, meaning the consumer dropped its `ChatStream`
                    // (and with it the chunk and outcome receivers).
                    Err(_) => {
                        debug!(
                            chat_id = ?request.chat_id,
                            "consumer dropped the chat stream, closing the connection"
                        );
                        return;
                    }
                }
            }
            next = body.next() => {
                match next {
                    Some(Ok(bytes)) => {
                        let frames = match decoder.push_bytes(&bytes) {
                            Ok(frames) => frames,
                            Err(err) => {
                                let _ = outcome_tx.send(Err(err.into()));
                                return;
                            }
                        };
                        for frame in frames {
                            if let Some(outcome) = delivery_outcome(deliver_frame(&tx, &frame, &mut delivered).await) {
                                let _ = outcome_tx.send(outcome);
                                return;
                            }
                        }
                    }
                    Some(Err(err)) => {
                        let _ = outcome_tx.send(Err(err.into()));
                        return;
                    }
                    None => {
                        // The backend closed the connection. A buffered
                        // remainder must still form one whole frame.
                        let outcome = match decoder.finish() {
                            Ok(Some(frame)) => {
                                delivery_outcome(deliver_frame(&tx, &frame, &mut delivered).await)
                                    .unwrap_or(Ok(()))
                            }
                            Ok(None) => Ok(()),
                            Err(err) => Err(err.into()),
                        };
                        let _ = outcome_tx.send(outcome);
                        return;
                    }
                }
            }
        }
    }
}

enum Delivery {
    Continue,
    TurnEnded,
    ReceiverGone,
    Broken(ClientError),
}

fn delivery_outcome(delivery: Delivery) -> Option<Result<(), ClientError>> {
    match delivery {
        Delivery::Continue => None,
        Delivery::TurnEnded => Some(Ok(())),
        Delivery::ReceiverGone => Some(Err(ClientError::protocol_msg(
            "chat stream receiver dropped during delivery",
        ))),
        Delivery::Broken(err) => Some(Err(err)),
    }
}

async fn deliver_frame(
    tx: &mpsc::Sender<StreamChunk>,
    frame: &serde_json::Value,
    delivered: &mut u64,
) -> Delivery {
    let chunk = match StreamChunk::from_value(frame) {
        Ok(chunk) => chunk,
        Err(DispatchError::UnknownType { tag }) => {
            debug!(%tag, "skipping unknown chunk type");
            return Delivery::Continue;
        }
        Err(err) => {
            return Delivery::Broken(
                DecodeError::InvalidChunk {
                    detail: err.to_string(),
                }
                .into(),
            );
        }
    };

    let ends_turn = chunk.ends_turn();
    debug!(tag = chunk.tag(), seq = *delivered, "delivering chat chunk");
    if tx.send(chunk).await.is_err() {
        return Delivery::ReceiverGone;
    }
    *delivered = delivered.saturating_add(1);
    if ends_turn {
        Delivery::TurnEnded
    } else {
        Delivery::Continue
    }
}

/// Folds one chunk into conversation state, guarded against stale turns.
///
/// Returns whether the chunk was applied. Session effects and assistant
/// failure notices are forwarded to `sessions`.
pub fn apply_chunk(
    state: &mut ConversationState,
    guard: &mut TurnGuard,
    chunk: &StreamChunk,
    sessions: &mut dyn SessionSink,
) -> bool {
    if !guard.admits(state.chat_id) {
        debug!(
            tag = chunk.tag(),
            active = ?state.chat_id,
            "discarding a chunk for a conversation that is no longer active"
        );
        return false;
    }

    let is_new_session = state.chat_id.is_none();
    let reduction = reduce(std::mem::take(state), chunk, is_new_session, Utc::now());
    *state = reduction.state;

    if is_new_session && let Some(chat_id) = state.chat_id {
        guard.adopt(chat_id);
    }
    match reduction.session {
        Some(SessionUpdate::Created(session)) => sessions.session_created(session),
        Some(SessionUpdate::Touched { chat_id, at }) => sessions.session_touched(chat_id, at),
        None => {}
    }
    if let Some(notice) = reduction.notice {
        sessions.failure(&notice);
    }
    true
}
