use futures_util::StreamExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use relay_channels::{ChannelError, OutboundChannel, RelaySettings, StreamRelay};
use relay_core::types::Role;
use relay_sessions::SessionStore;

use crate::claude_cli::GenerationBackend;

/// What one turn delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSummary {
    /// Everything the relay committed to the channel, in order.
    pub text: String,
    /// Token the session holds after the turn.
    pub continuation_token: Option<String>,
    /// An error event was relayed during the turn.
    pub failed: bool,
    pub messages_sent: usize,
}

/// Run one user turn end to end.
///
/// The user's session stays locked until the turn is over, so a second
/// message from the same user waits for the first reply to finish. The
/// session only learns a new continuation token, and only records the
/// assistant reply, when no error event was seen.
///
/// Returns `Err` only when the channel rejects a post or edit; CLI failures
/// are relayed to the user as warnings and reported via `TurnSummary::failed`.
#[instrument(
    skip(backend, sessions, channel, settings, text),
    fields(turn_id = %Uuid::now_v7(), chars = text.chars().count())
)]
pub async fn run_turn<B, C>(
    backend: &B,
    sessions: &SessionStore,
    channel: &C,
    settings: RelaySettings,
    user_id: &str,
    text: &str,
) -> Result<TurnSummary, ChannelError>
where
    B: GenerationBackend + ?Sized,
    C: OutboundChannel + ?Sized,
{
    let handle = sessions.get_or_create(user_id);
    let mut session = handle.lock().await;
    session.add_message(Role::User, text);
    let resume = session.continuation_token.clone();
    debug!(resume = ?resume, "turn started");

    let mut relay = StreamRelay::with_settings(channel, settings);
    let mut events = backend.stream(text, resume.as_deref());
    let mut latest_token = None;
    let mut failed = false;

    while let Some(event) = events.next().await {
        if let Some(token) = &event.continuation_token {
            latest_token = Some(token.clone());
        }
        if event.is_error() {
            warn!(error = %event.text, "relaying CLI failure");
            failed = true;
        }
        relay.handle_event(&event).await?;
    }
    relay.flush().await?;

    let full_text = relay.full_text();
    if !failed {
        if let Some(token) = latest_token {
            session.set_continuation_token(token);
        }
        if !full_text.is_empty() {
            session.add_message(Role::Assistant, full_text.clone());
        }
    }

    let summary = TurnSummary {
        text: full_text,
        continuation_token: session.continuation_token.clone(),
        failed,
        messages_sent: relay.sent_messages().len(),
    };
    info!(
        messages_sent = summary.messages_sent,
        failed = summary.failed,
        "turn complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use futures_util::stream;
    use relay_channels::RecordingChannel;
    use relay_core::types::{EventKind, StreamEvent};

    use super::*;
    use crate::claude_cli::EventStream;

    /// Replays the same events on every call and records what it was asked.
    struct ScriptedBackend {
        events: Vec<StreamEvent>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedBackend {
        fn new(events: Vec<StreamEvent>) -> Self {
            Self {
                events,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl GenerationBackend for ScriptedBackend {
        fn stream(&self, user_text: &str, continuation_token: Option<&str>) -> EventStream {
            self.calls
                .lock()
                .unwrap()
                .push((user_text.to_string(), continuation_token.map(String::from)));
            Box::pin(stream::iter(self.events.clone()))
        }
    }

    fn event(kind: EventKind, text: &str, token: Option<&str>) -> StreamEvent {
        StreamEvent::new(kind, text, serde_json::Value::Null).with_token(token.map(String::from))
    }

    fn settings() -> RelaySettings {
        RelaySettings {
            max_message_chars: 2000,
            min_edit_interval: Duration::ZERO,
        }
    }

    fn happy_path() -> Vec<StreamEvent> {
        vec![
            event(EventKind::System, "", Some("s1")),
            event(EventKind::TextDelta, "Hello ", Some("s1")),
            event(EventKind::TextDelta, "World!", Some("s1")),
            event(EventKind::Final, "Hello World!", Some("s1")),
        ]
    }

    #[tokio::test]
    async fn successful_turn_updates_session() {
        let backend = ScriptedBackend::new(happy_path());
        let sessions = SessionStore::new();
        let channel = RecordingChannel::new();

        let summary = run_turn(&backend, &sessions, &channel, settings(), "alice", "hi")
            .await
            .unwrap();

        assert_eq!(summary.text, "Hello World!");
        assert_eq!(summary.continuation_token.as_deref(), Some("s1"));
        assert!(!summary.failed);
        assert_eq!(summary.messages_sent, 1);
        assert_eq!(channel.contents(), vec!["Hello World!"]);

        let handle = sessions.get("alice").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.continuation_token.as_deref(), Some("s1"));
        let roles: Vec<Role> = session.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(session.messages[1].content, "Hello World!");
    }

    #[tokio::test]
    async fn next_turn_resumes_with_stored_token() {
        let backend = ScriptedBackend::new(happy_path());
        let sessions = SessionStore::new();
        let channel = RecordingChannel::new();

        run_turn(&backend, &sessions, &channel, settings(), "alice", "first")
            .await
            .unwrap();
        run_turn(&backend, &sessions, &channel, settings(), "alice", "second")
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls[0], ("first".to_string(), None));
        assert_eq!(calls[1], ("second".to_string(), Some("s1".to_string())));
    }

    #[tokio::test]
    async fn failed_turn_keeps_previous_token() {
        let backend = ScriptedBackend::new(vec![
            event(EventKind::System, "", Some("fresh")),
            event(EventKind::TextDelta, "partial", Some("fresh")),
            StreamEvent::error("response timed out after 120s"),
        ]);
        let sessions = SessionStore::new();
        sessions
            .get_or_create("alice")
            .lock()
            .await
            .set_continuation_token("old");
        let channel = RecordingChannel::new();

        let summary = run_turn(&backend, &sessions, &channel, settings(), "alice", "hi")
            .await
            .unwrap();

        assert!(summary.failed);
        assert_eq!(summary.continuation_token.as_deref(), Some("old"));
        assert_eq!(
            channel.contents(),
            vec![
                "partial".to_string(),
                "\u{26a0}\u{fe0f} response timed out after 120s".to_string()
            ]
        );

        let handle = sessions.get("alice").unwrap();
        let session = handle.lock().await;
        assert_eq!(session.continuation_token.as_deref(), Some("old"));
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.messages[0].role, Role::User);
    }

    #[tokio::test]
    async fn stream_without_result_is_still_flushed() {
        let backend = ScriptedBackend::new(vec![
            event(EventKind::TextDelta, "a", Some("s2")),
            event(EventKind::TextDelta, "b", Some("s2")),
        ]);
        let sessions = SessionStore::new();
        let channel = RecordingChannel::new();
        let throttled = RelaySettings {
            max_message_chars: 2000,
            min_edit_interval: Duration::from_secs(3600),
        };

        let summary = run_turn(&backend, &sessions, &channel, throttled, "bob", "go")
            .await
            .unwrap();

        assert_eq!(channel.contents(), vec!["ab"]);
        assert_eq!(summary.text, "ab");
        assert_eq!(summary.continuation_token.as_deref(), Some("s2"));
    }

    #[tokio::test]
    async fn channel_failure_aborts_the_turn() {
        let backend = ScriptedBackend::new(happy_path());
        let sessions = SessionStore::new();
        let channel = RecordingChannel::new();
        channel.fail_next_posts(10);

        let result = run_turn(&backend, &sessions, &channel, settings(), "alice", "hi").await;
        assert!(matches!(result, Err(ChannelError::SendFailed(_))));

        let handle = sessions.get("alice").unwrap();
        let session = handle.lock().await;
        assert!(session.continuation_token.is_none());
        assert_eq!(session.messages.len(), 1);
    }

    #[tokio::test]
    async fn users_do_not_share_tokens() {
        let backend = ScriptedBackend::new(happy_path());
        let sessions = SessionStore::new();
        let channel = RecordingChannel::new();

        run_turn(&backend, &sessions, &channel, settings(), "alice", "hi")
            .await
            .unwrap();
        run_turn(&backend, &sessions, &channel, settings(), "bob", "hi")
            .await
            .unwrap();

        assert_eq!(backend.calls()[1].1, None);
        assert_eq!(sessions.active_count(), 2);
    }
}
