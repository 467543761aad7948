use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::ChatId;

/// One conversation as the backend catalogs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: ChatId,
    pub title: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
}

/// Receiver for session-level effects produced while a reply streams.
pub trait SessionSink {
    /// A new conversation was adopted mid-stream.
    fn session_created(&mut self, session: ChatSession);
    /// A conversation finished a turn.
    fn session_touched(&mut self, chat_id: ChatId, at: DateTime<Utc>);
    /// The assistant reported an in-band failure.
    fn failure(&mut self, message: &str);
}

/// In-memory session catalog; the default [`SessionSink`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionList {
    pub sessions: Vec<ChatSession>,
    pub failures: Vec<String>,
}

impl SessionList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, chat_id: ChatId) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == chat_id)
    }
}

impl SessionSink for SessionList {
    fn session_created(&mut self, session: ChatSession) {
        // A replayed chat_info must not duplicate the entry.
        if self.get(session.id).is_some() {
            return;
        }
        self.sessions.push(session);
    }

    fn session_touched(&mut self, chat_id: ChatId, at: DateTime<Utc>) {
        if let Some(session) = self.sessions.iter_mut().find(|s| s.id == chat_id) {
            session.last_message_time = Some(at);
        }
    }

    fn failure(&mut self, message: &str) {
        self.failures.push(message.to_string());
    }
}

/// Correlates inbound chunks with the conversation a turn was started for.
///
/// The target is captured once, when the stream is opened; a conversation
/// that switches away afterwards leaves late chunks inadmissible. A turn
/// opened without a target admits chunks only until some other chat id is
/// adopted, then pins to it.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnGuard {
    target: Option<ChatId>,
    adopted: Option<ChatId>,
}

impl TurnGuard {
    /// Captures the active chat id at the moment the turn starts.
    pub fn capture(target: Option<ChatId>) -> Self {
        Self {
            target,
            adopted: None,
        }
    }

    /// Records the id a fresh conversation received from `chat_info`.
    pub fn adopt(&mut self, chat_id: ChatId) {
        if self.target.is_none() {
            self.adopted = Some(chat_id);
        }
    }

    /// Whether this turn may still act while `active` is the current
    /// conversation. Callers decide what an inadmissible turn skips.
    pub fn admits(&self, active: Option<ChatId>) -> bool {
        match (self.target, self.adopted, active) {
            (Some(target), _, Some(active)) => target == active,
            (Some(_), _, None) => false,
            (None, None, None) => true,
            (None, Some(adopted), Some(active)) => adopted == active,
            (None, _, _) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: i64, title: &str) -> ChatSession {
        ChatSession {
            id: ChatId(id),
            title: title.to_string(),
            created_at: Utc::now(),
            last_message_time: None,
            message_count: Some(1),
            is_archived: Some(false),
        }
    }

    #[test]
    fn guard_admits_only_the_captured_target() {
        let guard = TurnGuard::capture(Some(ChatId(7)));
        assert!(guard.admits(Some(ChatId(7))));
        assert!(!guard.admits(Some(ChatId(8))));
        assert!(!guard.admits(None));
    }

    #[test]
    fn untargeted_guard_admits_until_an_id_is_adopted() {
        let mut guard = TurnGuard::capture(None);
        assert!(guard.admits(None));
        // The user switched to another conversation before any id arrived.
        assert!(!guard.admits(Some(ChatId(5))));

        guard.adopt(ChatId(42));
        assert!(guard.admits(Some(ChatId(42))));
        assert!(!guard.admits(Some(ChatId(5))));
        assert!(!guard.admits(None));
    }

    #[test]
    fn adoption_never_overrides_an_explicit_target() {
        let mut guard = TurnGuard::capture(Some(ChatId(7)));
        guard.adopt(ChatId(42));
        assert!(guard.admits(Some(ChatId(7))));
        assert!(!guard.admits(Some(ChatId(42))));
    }

    #[test]
    fn session_list_inserts_are_idempotent_per_id() {
        let mut list = SessionList::new();
        list.session_created(session(1, "First"));
        list.session_created(session(1, "Duplicate"));
        assert_eq!(list.sessions.len(), 1);
        assert_eq!(list.sessions[0].title, "First");
    }

    #[test]
    fn touch_refreshes_recency_only_for_known_sessions() {
        let mut list = SessionList::new();
        list.session_created(session(1, "First"));
        let at = Utc::now();
        list.session_touched(ChatId(1), at);
        list.session_touched(ChatId(99), at);
        assert_eq!(list.sessions[0].last_message_time, Some(at));
        assert_eq!(list.sessions.len(), 1);
    }

    #[test]
    fn failures_accumulate_in_order() {
        let mut list = SessionList::new();
        list.failure("first");
        list.failure("second");
        assert_eq!(list.failures, vec!["first", "second"]);
    }
}
