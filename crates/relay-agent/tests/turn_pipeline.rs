// Full turns through the real process client: script CLI -> relay -> session.
#![cfg(unix)]

use std::time::Duration;

use relay_agent::{run_turn, ClaudeCliClient};
use relay_channels::{RecordingChannel, RelaySettings};
use relay_sessions::SessionStore;

const ECHO_CLI: &str = r#"printf '{"type":"system","session_id":"sess-%s"}\n' "$#"
printf '{"type":"assistant","message":{"content":[{"type":"text","text":"%s"}]},"session_id":"sess-%s"}\n' "$*" "$#"
printf '{"type":"result","result":"done","session_id":"sess-%s"}\n' "$#"
"#;

fn settings() -> RelaySettings {
    RelaySettings {
        max_message_chars: 2000,
        min_edit_interval: Duration::ZERO,
    }
}

#[tokio::test]
async fn second_turn_resumes_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("claude.sh");
    std::fs::write(&script, ECHO_CLI).unwrap();
    let client = ClaudeCliClient::new("sh")
        .with_command_args(vec![script.to_string_lossy().into_owned()]);

    let sessions = SessionStore::new();
    let channel = RecordingChannel::with_max_chars(2000);

    // `-p hi --output-format stream-json --verbose` is five arguments.
    let first = run_turn(&client, &sessions, &channel, settings(), "42", "hi")
        .await
        .unwrap();
    assert_eq!(first.text, "-p hi --output-format stream-json --verbose");
    assert_eq!(first.continuation_token.as_deref(), Some("sess-5"));

    let second = run_turn(&client, &sessions, &channel, settings(), "42", "again")
        .await
        .unwrap();
    assert_eq!(
        second.text,
        "-p again --resume sess-5 --output-format stream-json --verbose"
    );
    assert_eq!(second.continuation_token.as_deref(), Some("sess-7"));

    let handle = sessions.get("42").unwrap();
    assert_eq!(handle.lock().await.messages.len(), 4);
    assert_eq!(channel.contents().len(), 2);
}

#[tokio::test]
async fn missing_binary_posts_warning_and_keeps_session_clean() {
    let client = ClaudeCliClient::new("/nonexistent/claude-relay-test-binary");
    let sessions = SessionStore::new();
    let channel = RecordingChannel::new();

    let summary = run_turn(&client, &sessions, &channel, settings(), "7", "hi")
        .await
        .unwrap();

    assert!(summary.failed);
    assert!(summary.text.is_empty());
    assert_eq!(
        channel.contents(),
        vec!["\u{26a0}\u{fe0f} claude CLI not found at '/nonexistent/claude-relay-test-binary', check the installation"]
    );
    let handle = sessions.get("7").unwrap();
    let session = handle.lock().await;
    assert!(session.continuation_token.is_none());
    assert_eq!(session.messages.len(), 1);
}
