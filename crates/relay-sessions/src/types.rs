use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use relay_core::config::DEFAULT_MAX_HISTORY;
use relay_core::types::Role;

/// One entry of a user's conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Per-user conversation state kept between turns.
///
/// The history is informational; continuity with the CLI comes entirely from
/// `continuation_token`, which is handed back via `--resume` on the next turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub messages: Vec<ConversationMessage>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub continuation_token: Option<String>,
    /// Oldest messages are dropped once `messages` grows past this.
    #[serde(skip, default = "default_history_limit")]
    history_limit: usize,
}

fn default_history_limit() -> usize {
    DEFAULT_MAX_HISTORY
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self::with_history_limit(user_id, DEFAULT_MAX_HISTORY)
    }

    pub fn with_history_limit(user_id: impl Into<String>, history_limit: usize) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            messages: Vec::new(),
            created_at: now,
            last_activity: now,
            continuation_token: None,
            history_limit: history_limit.max(1),
        }
    }

    /// Append a message and bump `last_activity`.
    pub fn add_message(&mut self, role: Role, content: impl Into<String>) {
        let now = Utc::now();
        self.messages.push(ConversationMessage {
            role,
            content: content.into(),
            timestamp: now,
        });
        if self.messages.len() > self.history_limit {
            let excess = self.messages.len() - self.history_limit;
            self.messages.drain(..excess);
        }
        self.last_activity = now;
    }

    /// The last `max` messages, oldest first.
    pub fn recent_messages(&self, max: usize) -> &[ConversationMessage] {
        let start = self.messages.len().saturating_sub(max);
        &self.messages[start..]
    }

    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    pub fn set_continuation_token(&mut self, token: impl Into<String>) {
        self.continuation_token = Some(token.into());
        self.last_activity = Utc::now();
    }

    /// Drop the history and the continuation token; the next turn starts a
    /// fresh CLI conversation.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.continuation_token = None;
        self.last_activity = Utc::now();
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_activity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_empty() {
        let session = Session::new("42");
        assert_eq!(session.user_id, "42");
        assert!(session.messages.is_empty());
        assert!(session.continuation_token.is_none());
        assert_eq!(session.created_at, session.last_activity);
    }

    #[test]
    fn recent_messages_keeps_the_tail() {
        let mut session = Session::with_history_limit("u", 100);
        for i in 0..60 {
            session.add_message(Role::User, format!("m{i}"));
        }

        let recent = session.recent_messages(50);
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0].content, "m10");
        assert_eq!(recent[49].content, "m59");
        assert_eq!(session.recent_messages(100).len(), 60);
    }

    #[test]
    fn history_is_capped_at_limit() {
        let mut session = Session::new("u");
        for i in 0..(DEFAULT_MAX_HISTORY + 5) {
            session.add_message(Role::User, format!("m{i}"));
        }

        assert_eq!(session.messages.len(), DEFAULT_MAX_HISTORY);
        assert_eq!(session.messages[0].content, "m5");
        assert_eq!(session.history_limit(), DEFAULT_MAX_HISTORY);
    }

    #[test]
    fn clear_drops_history_and_token() {
        let mut session = Session::new("u");
        session.add_message(Role::User, "hi");
        session.add_message(Role::Assistant, "hello");
        session.set_continuation_token("abc");

        session.clear();
        assert!(session.messages.is_empty());
        assert!(session.continuation_token.is_none());
    }

    #[test]
    fn message_serializes_with_lowercase_role() {
        let mut session = Session::new("u");
        session.add_message(Role::Assistant, "ok");
        let json = serde_json::to_value(&session.messages[0]).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "ok");
    }
}
