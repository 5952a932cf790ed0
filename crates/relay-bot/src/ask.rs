//! One-shot `ask` subcommand: a single turn against the CLI, printed to stdout.

use futures_util::StreamExt;
use tokio::io::{AsyncWriteExt, Stdout};

use relay_agent::ClaudeCliClient;
use relay_core::types::EventKind;

pub async fn run(
    client: &ClaudeCliClient,
    text: &str,
    resume: Option<&str>,
    stream: bool,
) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();

    let token = if stream {
        stream_reply(client, text, resume, &mut stdout).await?
    } else {
        let outcome = client.send(text, resume).await;
        if let Some(err) = outcome.error {
            anyhow::bail!(err);
        }
        stdout.write_all(outcome.text.as_bytes()).await?;
        outcome.continuation_token
    };

    stdout.write_all(b"\n").await?;
    stdout.flush().await?;

    if let Some(token) = token {
        eprintln!("session: {token}  (continue with --resume {token})");
    }
    Ok(())
}

/// Print deltas as they arrive; returns the last continuation token seen.
async fn stream_reply(
    client: &ClaudeCliClient,
    text: &str,
    resume: Option<&str>,
    stdout: &mut Stdout,
) -> anyhow::Result<Option<String>> {
    let mut events = client.stream(text, resume);
    let mut token = None;

    while let Some(event) = events.next().await {
        if let Some(t) = &event.continuation_token {
            token = Some(t.clone());
        }
        match event.kind {
            EventKind::TextDelta => {
                stdout.write_all(event.text.as_bytes()).await?;
                stdout.flush().await?;
            }
            EventKind::Error => anyhow::bail!(event.text),
            EventKind::System | EventKind::Final | EventKind::Unknown => {}
        }
    }
    Ok(token)
}
