use serde::{Deserialize, Serialize};

/// Classification of one line emitted by `claude --output-format stream-json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Session bootstrap line; carries the continuation token.
    System,
    /// Incremental assistant text.
    TextDelta,
    /// Terminal `result` line of a successful run.
    Final,
    /// Synthesized by the client for spawn failures, timeouts and non-zero exits.
    /// The parser never produces it.
    Error,
    /// Anything with an unrecognized `type`.
    Unknown,
}

/// One parsed unit from the generation process.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: EventKind,
    /// Incremental or final text; empty for non-text kinds.
    pub text: String,
    /// Opaque id usable with `--resume` on the next turn.
    pub continuation_token: Option<String>,
    /// The decoded line, kept so unrecognized fields stay reachable.
    /// `Value::Null` for synthesized events.
    pub raw: serde_json::Value,
}

impl StreamEvent {
    pub fn new(kind: EventKind, text: impl Into<String>, raw: serde_json::Value) -> Self {
        Self {
            kind,
            text: text.into(),
            continuation_token: None,
            raw,
        }
    }

    /// A synthesized error event carrying a channel-postable message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message, serde_json::Value::Null)
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.continuation_token = token;
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == EventKind::Error
    }
}

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_event_has_no_token_or_raw() {
        let ev = StreamEvent::error("boom");
        assert!(ev.is_error());
        assert_eq!(ev.text, "boom");
        assert!(ev.continuation_token.is_none());
        assert!(ev.raw.is_null());
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, r#""assistant""#);
        assert_eq!(Role::User.to_string(), "user");
        assert!(serde_json::from_str::<Role>(r#""system""#).is_err());
    }
}
