use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::{ChatId, STATUS_COMPLETE, StreamChunk};
use crate::session::ChatSession;

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message in a conversation, local or fetched from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content, Utc::now())
    }
}

/// Accumulated view of one conversation as the stream unfolds.
///
/// `chat_id` is `None` until the backend assigns one via `chat_info`;
/// `typing` reflects whether a reply is currently being produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    pub chat_id: Option<ChatId>,
    pub messages: Vec<Message>,
    pub typing: bool,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State for resuming an existing conversation.
    pub fn for_chat(chat_id: ChatId) -> Self {
        Self {
            chat_id: Some(chat_id),
            ..Self::default()
        }
    }

    /// Records the outgoing user message before the reply streams in.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }
}

/// Side effect a reduction asks the session layer to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A brand-new conversation was adopted; register it in the list.
    Created(ChatSession),
    /// An existing conversation finished a turn; refresh its recency.
    Touched { chat_id: ChatId, at: DateTime<Utc> },
}

/// Result of folding one chunk into the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    pub state: ConversationState,
    pub session: Option<SessionUpdate>,
    pub notice: Option<String>,
}

impl Reduction {
    fn state_only(state: ConversationState) -> Self {
        Self {
            state,
            session: None,
            notice: None,
        }
    }
}

/// Folds one chunk into the conversation state.
///
/// Pure in everything but the clock: equal inputs and `now` produce equal
/// reductions, and the returned state is the only state mutation. The
/// caller decides `is_new_session` from whether an active chat id existed
/// when the stream was opened, not from the chunk itself.
pub fn reduce(
    mut state: ConversationState,
    chunk: &StreamChunk,
    is_new_session: bool,
    now: DateTime<Utc>,
) -> Reduction {
    match chunk {
        StreamChunk::ChatInfo { chat_id, title } => {
            if !is_new_session {
                // Resumed conversations already know their id; the echo
                // carries nothing to apply.
                return Reduction::state_only(state);
            }
            state.chat_id = Some(*chat_id);
            let session = ChatSession {
                id: *chat_id,
                title: title.clone().unwrap_or_else(|| "New Chat".to_string()),
                created_at: now,
                last_message_time: Some(now),
                message_count: Some(1),
                is_archived: Some(false),
            };
            Reduction {
                state,
                session: Some(SessionUpdate::Created(session)),
                notice: None,
            }
        }
        StreamChunk::TextDelta { delta } => {
            match state.messages.last_mut() {
                Some(last) if last.role == Role::Assistant => last.content.push_str(delta),
                _ => state
                    .messages
                    .push(Message::new(Role::Assistant, delta.clone(), now)),
            }
            state.typing = true;
            Reduction::state_only(state)
        }
        StreamChunk::Status { status, chat_id } => {
            if status != STATUS_COMPLETE {
                return Reduction::state_only(state);
            }
            state.typing = false;
            Reduction {
                state,
                session: Some(SessionUpdate::Touched {
                    chat_id: *chat_id,
                    at: now,
                }),
                notice: None,
            }
        }
        StreamChunk::Error { message } => {
            state.typing = false;
            Reduction {
                state,
                session: None,
                notice: Some(message.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> StreamChunk {
        StreamChunk::TextDelta {
            delta: text.to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn deltas_concatenate_into_one_assistant_message() {
        let mut state = ConversationState::for_chat(ChatId(7));
        state.push_user("hi");
        for text in ["Hel", "lo", " there"] {
            state = reduce(state, &delta(text), false, now()).state;
        }
        let assistant: Vec<_> = state
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .collect();
        assert_eq!(assistant.len(), 1);
        assert_eq!(assistant[0].content, "Hello there");
        assert!(state.typing);
    }

    #[test]
    fn delta_appends_when_last_message_is_from_the_user() {
        let mut state = ConversationState::for_chat(ChatId(7));
        state.push_user("question");
        state = reduce(state, &delta("answer"), false, now()).state;
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].role, Role::Assistant);
        assert_eq!(state.messages[1].content, "answer");
    }

    #[test]
    fn chat_info_adopts_the_id_only_for_new_sessions() {
        let info = StreamChunk::ChatInfo {
            chat_id: ChatId(42),
            title: Some("Radiation Safety".to_string()),
        };

        let fresh = reduce(ConversationState::new(), &info, true, now());
        assert_eq!(fresh.state.chat_id, Some(ChatId(42)));
        match fresh.session {
            Some(SessionUpdate::Created(session)) => {
                assert_eq!(session.id, ChatId(42));
                assert_eq!(session.title, "Radiation Safety");
                assert_eq!(session.message_count, Some(1));
                assert_eq!(session.is_archived, Some(false));
            }
            other => panic!("expected a created session, got {other:?}"),
        }

        let resumed = reduce(ConversationState::for_chat(ChatId(7)), &info, false, now());
        assert_eq!(resumed.state.chat_id, Some(ChatId(7)));
        assert!(resumed.session.is_none());
    }

    #[test]
    fn chat_info_without_title_defaults_the_session_name() {
        let info = StreamChunk::ChatInfo {
            chat_id: ChatId(9),
            title: None,
        };
        let out = reduce(ConversationState::new(), &info, true, now());
        match out.session {
            Some(SessionUpdate::Created(session)) => assert_eq!(session.title, "New Chat"),
            other => panic!("expected a created session, got {other:?}"),
        }
    }

    #[test]
    fn complete_status_clears_typing_and_touches_the_session() {
        let mut state = ConversationState::for_chat(ChatId(3));
        state = reduce(state, &delta("done"), false, now()).state;
        assert!(state.typing);

        let complete = StreamChunk::Status {
            status: "complete".to_string(),
            chat_id: ChatId(3),
        };
        let out = reduce(state, &complete, false, now());
        assert!(!out.state.typing);
        assert!(matches!(
            out.session,
            Some(SessionUpdate::Touched { chat_id: ChatId(3), .. })
        ));

        // Applying it again changes nothing further.
        let again = reduce(out.state.clone(), &complete, false, now());
        assert!(!again.state.typing);
        assert_eq!(again.state.messages, out.state.messages);
    }

    #[test]
    fn unrecognized_status_is_a_no_op() {
        let mut state = ConversationState::for_chat(ChatId(3));
        state = reduce(state, &delta("partial"), false, now()).state;
        let out = reduce(
            state.clone(),
            &StreamChunk::Status {
                status: "thinking".to_string(),
                chat_id: ChatId(3),
            },
            false,
            now(),
        );
        assert_eq!(out.state, state);
        assert!(out.session.is_none());
    }

    #[test]
    fn error_preserves_partial_content_and_surfaces_a_notice() {
        let mut state = ConversationState::for_chat(ChatId(3));
        state = reduce(state, &delta("Hel"), false, now()).state;
        state = reduce(state, &delta("lo"), false, now()).state;

        let out = reduce(
            state,
            &StreamChunk::Error {
                message: "model unavailable".to_string(),
            },
            false,
            now(),
        );
        assert!(!out.state.typing);
        assert_eq!(out.notice.as_deref(), Some("model unavailable"));
        assert_eq!(out.state.messages.last().map(|m| m.content.as_str()), Some("Hello"));
    }

    #[test]
    fn full_turn_folds_to_the_expected_final_state() {
        let chunks = [
            StreamChunk::ChatInfo {
                chat_id: ChatId(42),
                title: Some("Radiation Safety".to_string()),
            },
            delta("Hel"),
            delta("lo"),
            StreamChunk::Status {
                status: "complete".to_string(),
                chat_id: ChatId(42),
            },
        ];

        let mut state = ConversationState::new();
        state.push_user("what are the exposure limits?");
        for chunk in &chunks {
            let is_new = state.chat_id.is_none();
            state = reduce(state, chunk, is_new, now()).state;
        }

        assert_eq!(state.chat_id, Some(ChatId(42)));
        assert!(!state.typing);
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[1].role, Role::Assistant);
        assert_eq!(state.messages[1].content, "Hello");
    }
}
