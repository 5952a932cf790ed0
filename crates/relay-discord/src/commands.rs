//! Text commands typed into a console, intercepted before the CLI.

use relay_sessions::{SessionError, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Forget the conversation; the next message starts a fresh CLI session.
    Reset,
    Help,
}

impl ConsoleCommand {
    /// `Some` only for an exact, case-insensitive command word.
    pub fn parse(content: &str) -> Option<Self> {
        match content.trim().to_ascii_lowercase().as_str() {
            "/reset" => Some(Self::Reset),
            "/help" => Some(Self::Help),
            _ => None,
        }
    }

    /// Apply the command and return the reply to post.
    pub fn execute(self, sessions: &SessionStore, user_id: &str) -> String {
        match self {
            Self::Reset => match sessions.clear(user_id) {
                Ok(()) | Err(SessionError::NotFound { .. }) => {
                    "\u{1f504} Conversation reset.".to_string()
                }
                Err(SessionError::Busy { .. }) => {
                    "\u{26a0}\u{fe0f} A reply is still streaming, try again when it finishes."
                        .to_string()
                }
            },
            Self::Help => "**Console commands**\n\
                 - `/reset`: start a new conversation\n\
                 - `/help`: show this help\n\
                 Anything else is sent to Claude."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_commands() {
        assert_eq!(ConsoleCommand::parse("/reset"), Some(ConsoleCommand::Reset));
        assert_eq!(ConsoleCommand::parse("  /HELP "), Some(ConsoleCommand::Help));
        assert_eq!(ConsoleCommand::parse("/reset now"), None);
        assert_eq!(ConsoleCommand::parse("hello"), None);
    }

    #[tokio::test]
    async fn reset_clears_the_token() {
        let sessions = SessionStore::new();
        sessions
            .get_or_create("u")
            .lock()
            .await
            .set_continuation_token("tok");

        let reply = ConsoleCommand::Reset.execute(&sessions, "u");
        assert!(reply.contains("reset"));
        let handle = sessions.get("u").unwrap();
        assert!(handle.lock().await.continuation_token.is_none());
    }

    #[test]
    fn reset_without_session_is_fine() {
        let sessions = SessionStore::new();
        let reply = ConsoleCommand::Reset.execute(&sessions, "nobody");
        assert!(reply.contains("reset"));
    }
}
