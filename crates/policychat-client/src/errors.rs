/// Framing failures while decoding the streaming response body.
///
/// Any of these breaks the stream: chat coherency depends on lossless,
/// ordered delivery, so a frame that cannot be recovered ends the turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A complete frame was not valid JSON.
    #[error("malformed frame: {detail}")]
    MalformedFrame { detail: String },
    /// A frame carried no usable chunk (missing discriminant or a known
    /// chunk type with an invalid payload).
    #[error("invalid chunk: {detail}")]
    InvalidChunk { detail: String },
    /// The transport closed with a partial frame still buffered.
    #[error("transport closed mid-frame ({buffered} bytes buffered)")]
    TruncatedFrame { buffered: usize },
}

impl DecodeError {
    /// Creates a malformed-frame error from a parser message.
    pub(crate) fn malformed(detail: impl Into<String>) -> Self {
        Self::MalformedFrame {
            detail: detail.into(),
        }
    }
}

/// Classification failures for one decoded frame.
///
/// `UnknownType` is recoverable (the protocol is additive, so unrecognized
/// chunk types are skipped); the other variants mean the stream is broken.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The `type` discriminant named a chunk this client does not know.
    #[error("unknown chunk type `{tag}`")]
    UnknownType { tag: String },
    /// The frame carried no `type` discriminant at all.
    #[error("frame has no `type` discriminant")]
    MissingType,
    /// A known chunk type arrived with an invalid payload shape.
    #[error("invalid `{tag}` payload: {detail}")]
    InvalidPayload { tag: String, detail: String },
}

/// Connection-level failures talking to the chat backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be sent.
    #[error("request failed: {message}")]
    Request { message: String },
    /// The server answered with a non-success status.
    #[error("server rejected request with status {status}: {message}")]
    Status { status: u16, message: String },
    /// Reading the streaming body failed mid-flight.
    #[error("stream read failed: {message}")]
    Read { message: String },
}

impl TransportError {
    /// Creates a request-level error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request {
            message: message.into(),
        }
    }

    /// Creates a non-success-status error.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Creates a body-read error.
    pub fn read(message: impl Into<String>) -> Self {
        Self::Read {
            message: message.into(),
        }
    }
}

/// Top-level error type for the public client API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client or transport configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid user input to the client API.
    #[error("validation error: {0}")]
    Validation(String),
    /// Connection-level failure; the caller owns any retry policy.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The stream body could not be decoded; the turn is over.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The turn was cancelled by the caller.
    #[error("stream cancelled")]
    Cancelled,
    /// The assistant reported an in-band failure for this turn.
    ///
    /// Only returned by callers that have no failure channel of their own
    /// (for example `ChatClient::collect_reply`); the streaming path delivers
    /// the `error` chunk instead.
    #[error("assistant failure: {0}")]
    Assistant(String),
    /// Internal protocol misuse or invariant violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }
}
