//! Common imports for typical client usage.
//!
//! This module intentionally exports the most frequently used client/state
//! types so examples and application code need fewer import lines.
pub use crate::{
    BackendConfig, CancelHandle, ChatClient, ChatClientBuilder, ChatId, ChatRequest, ChatSession,
    ChatStream, ChatTransport, ClientError, ConversationState, HttpBackend, Message, Role,
    SessionList, SessionSink, StreamChunk, StreamOptions,
};
