use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;

/// The `status` value that ends generation for a turn.
pub(crate) const STATUS_COMPLETE: &str = "complete";

/// Server-assigned chat session identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ChatId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// One typed event of an in-progress assistant reply.
///
/// The wire shape is an internally tagged JSON object; the `type` field
/// selects the variant. Chunks for one stream arrive in a single total
/// order, and a stream never emits `TextDelta` before its first `ChatInfo`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// First event of every stream; announces the session identity.
    ///
    /// Emitted for both new and existing sessions. Existing sessions ignore
    /// the id; new sessions adopt it exactly once.
    ChatInfo {
        chat_id: ChatId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    /// Incremental fragment of assistant output, concatenated in arrival
    /// order onto the turn's assistant message.
    TextDelta { delta: String },
    /// Out-of-band lifecycle signal; `complete` marks end of generation.
    /// Other values are reserved and have no content effect.
    Status { status: String, chat_id: ChatId },
    /// Terminal-for-this-turn failure; accumulated content is kept.
    Error { message: String },
}

impl StreamChunk {
    /// Classifies one decoded frame by its `type` discriminant.
    ///
    /// Unknown discriminants come back as [`DispatchError::UnknownType`] so
    /// the caller can skip them; a missing discriminant or an invalid payload
    /// for a known type means the stream is broken.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, DispatchError> {
        let Some(tag) = value.get("type").and_then(|v| v.as_str()) else {
            return Err(DispatchError::MissingType);
        };
        match tag {
            "chat_info" | "text_delta" | "status" | "error" => {
                serde_json::from_value(value.clone()).map_err(|e| DispatchError::InvalidPayload {
                    tag: tag.to_string(),
                    detail: e.to_string(),
                })
            }
            _ => Err(DispatchError::UnknownType {
                tag: tag.to_string(),
            }),
        }
    }

    /// Wire tag of this chunk.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ChatInfo { .. } => "chat_info",
            Self::TextDelta { .. } => "text_delta",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
        }
    }

    /// True for the chunks that end generation for this turn.
    pub fn ends_turn(&self) -> bool {
        match self {
            Self::Status { status, .. } => status == STATUS_COMPLETE,
            Self::Error { .. } => true,
            Self::ChatInfo { .. } | Self::TextDelta { .. } => false,
        }
    }
}
