//! Streaming client for a policy-chat backend.
//!
//! Replies arrive as a newline-framed JSON chunk stream; this crate decodes
//! them incrementally, folds them into conversation state, and keeps the
//! session catalog in step. HTTP specifics live behind the `ChatTransport`
//! seam in `http`.
//!
//! # Sending a message
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use policychat_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let backend = HttpBackend::from_env()?;
//! let client = ChatClient::new(Arc::new(backend));
//!
//! let mut state = ConversationState::new();
//! let mut sessions = SessionList::new();
//! client
//!     .send("What is the exposure limit?", &mut state, &mut sessions)
//!     .await?;
//!
//! if let Some(reply) = state.messages.last() {
//!     println!("{}: {}", reply.role, reply.content);
//! }
//! # Ok(())
//! # }
//! ```

/// Wire chunk types and their discriminant-based classification.
pub mod chunk;
/// Chat client, streaming handle, and cancellation handle.
pub mod client;
/// Conversation state and the chunk reducer.
pub mod conversation;
/// Incremental framing of the streaming response body.
pub mod decode;
/// Public error types used by the client API.
pub mod errors;
/// HTTP backend: streaming transport plus session endpoints.
pub mod http;
/// Common imports for typical usage.
pub mod prelude;
/// Session catalog, sink contract, and turn correlation.
pub mod session;
/// Transport contract between the pipeline and a backend.
pub mod transport;

pub use chunk::{ChatId, StreamChunk};
pub use client::{CancelHandle, ChatClient, ChatClientBuilder, ChatStream, apply_chunk};
pub use conversation::{ConversationState, Message, Reduction, Role, SessionUpdate, reduce};
pub use errors::{ClientError, DecodeError, DispatchError, TransportError};
pub use http::{BackendConfig, HttpBackend};
pub use session::{ChatSession, SessionList, SessionSink, TurnGuard};
pub use transport::{ByteStream, ChatRequest, ChatTransport, StreamOptions};
