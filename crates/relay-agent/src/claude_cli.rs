use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use relay_core::config::ClaudeConfig;
use relay_core::types::StreamEvent;

use crate::stream::parse_line;

pub use relay_core::config::DEFAULT_TIMEOUT_SECS;

/// Used when the CLI exits non-zero without writing anything to stderr.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// Upper bound on reading leftover output after the child is gone. Both pipes
/// share one grace window.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Forward-only sequence of events from one CLI invocation.
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Everything that can end an invocation early.
///
/// The `Display` strings are posted to users verbatim, so they stay short and
/// free of debug formatting.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("claude CLI not found at '{command}', check the installation")]
    NotFound { command: String },

    #[error("failed to start claude CLI: {0}")]
    Spawn(std::io::Error),

    #[error("response timed out after {}", format_duration(.timeout))]
    Timeout { timeout: Duration },

    #[error("claude CLI error: {message}")]
    Exit { code: Option<i32>, message: String },

    #[error("claude CLI process error: {0}")]
    Wait(std::io::Error),
}

/// Terminal result of a non-streaming invocation.
///
/// Exactly one of `success` and `error.is_some()` holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub success: bool,
    pub text: String,
    pub continuation_token: Option<String>,
    pub error: Option<String>,
}

impl ProcessOutcome {
    fn ok(text: impl Into<String>, continuation_token: Option<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
            continuation_token,
            error: None,
        }
    }

    fn failed(err: &CliError, continuation_token: Option<String>) -> Self {
        Self {
            success: false,
            text: String::new(),
            continuation_token,
            error: Some(err.to_string()),
        }
    }
}

/// Source of stream events for one turn.
///
/// Implemented by [`ClaudeCliClient`]; the turn pipeline only depends on this
/// trait so it can be driven by scripted backends.
pub trait GenerationBackend: Send + Sync {
    fn stream(&self, user_text: &str, continuation_token: Option<&str>) -> EventStream;
}

/// Runs `claude -p` as a child process, one process per turn.
///
/// Every exit path ends with the child either observed as exited or killed
/// and its pipes drained. Children are also spawned with `kill_on_drop`, so
/// abandoning a stream half-way never leaks a process.
#[derive(Debug, Clone)]
pub struct ClaudeCliClient {
    command: String,
    command_args: Vec<String>,
    timeout: Duration,
}

impl Default for ClaudeCliClient {
    fn default() -> Self {
        Self::new("claude")
    }
}

impl ClaudeCliClient {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            command_args: Vec::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &ClaudeConfig) -> Self {
        Self::new(config.command.clone())
            .with_command_args(config.command_args.clone())
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    /// Launcher arguments placed between the binary and `-p`
    /// (e.g. `npx @anthropic-ai/claude-code`).
    pub fn with_command_args(mut self, args: Vec<String>) -> Self {
        self.command_args = args;
        self
    }

    /// Budget for the whole invocation, output draining included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Full argv for one invocation, binary first.
    ///
    /// `<command> [args..] -p <text> [--resume <token>] [--output-format stream-json --verbose]`
    pub fn invocation(
        &self,
        user_text: &str,
        continuation_token: Option<&str>,
        streaming: bool,
    ) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.command_args.len() + 8);
        argv.push(self.command.clone());
        argv.extend(self.command_args.iter().cloned());
        argv.push("-p".to_string());
        argv.push(user_text.to_string());

        if let Some(token) = continuation_token {
            argv.push("--resume".to_string());
            argv.push(token.to_string());
        }

        if streaming {
            argv.push("--output-format".to_string());
            argv.push("stream-json".to_string());
            argv.push("--verbose".to_string());
        }

        argv
    }

    /// Run the CLI to completion and return its trimmed stdout.
    ///
    /// The continuation token is passed through unchanged: plain `-p` output
    /// does not report a session id.
    pub async fn send(&self, user_text: &str, continuation_token: Option<&str>) -> ProcessOutcome {
        let argv = self.invocation(user_text, continuation_token, false);
        let token = continuation_token.map(str::to_string);

        info!(
            command = %self.command,
            resume = token.is_some(),
            prompt_len = user_text.len(),
            "running claude CLI"
        );

        match run_to_completion(&argv, self.timeout).await {
            Ok(stdout) => {
                debug!(output_len = stdout.len(), "claude CLI response received");
                ProcessOutcome::ok(stdout.trim(), token)
            }
            Err(e) => {
                warn!(error = %e, "claude CLI invocation failed");
                ProcessOutcome::failed(&e, token)
            }
        }
    }

    /// Spawn the CLI in stream-json mode and yield parsed events as lines arrive.
    ///
    /// The stream is lazy (nothing is spawned until first poll) and cannot be
    /// restarted. It ends after the process exits cleanly, or after exactly one
    /// synthesized [`EventKind::Error`](relay_core::types::EventKind::Error)
    /// event for spawn failure, timeout or a non-zero exit. Events yielded
    /// before a timeout are never retracted.
    pub fn stream(&self, user_text: &str, continuation_token: Option<&str>) -> EventStream {
        let argv = self.invocation(user_text, continuation_token, true);
        let timeout = self.timeout;
        let command = self.command.clone();
        let resume = continuation_token.is_some();
        let prompt_len = user_text.len();

        Box::pin(async_stream::stream! {
            let deadline = Instant::now() + timeout;

            info!(command = %command, resume, prompt_len, "streaming from claude CLI");

            let (mut child, stdout) = match spawn_process(&argv) {
                Ok(spawned) => spawned,
                Err(e) => {
                    warn!(error = %e, "claude CLI spawn failed");
                    yield StreamEvent::error(e.to_string());
                    return;
                }
            };
            let stderr = PipeCollector::spawn(child.stderr.take());

            let mut reader = BufReader::new(stdout);
            let mut line = Vec::with_capacity(4096);
            loop {
                line.clear();
                match tokio::time::timeout_at(deadline, reader.read_until(b'\n', &mut line)).await {
                    Ok(Ok(0)) => break,
                    Ok(Ok(_)) => {
                        if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                            debug!(kind = ?event.kind, text_len = event.text.len(), "stream event");
                            yield event;
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "reading claude CLI stdout failed");
                        break;
                    }
                    Err(_) => {
                        warn!(timeout_ms = timeout.as_millis() as u64, "claude CLI timed out, killing");
                        terminate(&mut child).await;
                        let grace = Instant::now() + DRAIN_GRACE;
                        tokio::join!(drain(&mut reader, grace), stderr.finish(grace));
                        yield StreamEvent::error(CliError::Timeout { timeout }.to_string());
                        return;
                    }
                }
            }

            let status = match tokio::time::timeout_at(deadline, child.wait()).await {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    stderr.abort();
                    yield StreamEvent::error(CliError::Wait(e).to_string());
                    return;
                }
                Err(_) => {
                    warn!(timeout_ms = timeout.as_millis() as u64, "claude CLI did not exit in time, killing");
                    terminate(&mut child).await;
                    stderr.abort();
                    yield StreamEvent::error(CliError::Timeout { timeout }.to_string());
                    return;
                }
            };

            if status.success() {
                stderr.abort();
                debug!("claude CLI exited cleanly");
            } else {
                let stderr = stderr.finish(Instant::now() + DRAIN_GRACE).await;
                let err = exit_error(status.code(), &stderr);
                warn!(code = ?status.code(), error = %err, "claude CLI exited with failure");
                yield StreamEvent::error(err.to_string());
            }
        })
    }
}

impl GenerationBackend for ClaudeCliClient {
    fn stream(&self, user_text: &str, continuation_token: Option<&str>) -> EventStream {
        ClaudeCliClient::stream(self, user_text, continuation_token)
    }
}

/// Spawn `argv` with piped stdout/stderr and a null stdin.
fn spawn_process(argv: &[String]) -> Result<(Child, ChildStdout), CliError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(CliError::NotFound {
            command: String::new(),
        });
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CliError::NotFound {
                    command: program.clone(),
                }
            } else {
                CliError::Spawn(e)
            }
        })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        CliError::Spawn(std::io::Error::other("child stdout was not captured"))
    })?;

    debug!(pid = ?child.id(), "claude CLI spawned");
    Ok((child, stdout))
}

/// Non-streaming path: wait for exit within `timeout`, collecting both pipes
/// concurrently so a full pipe can never stall the child.
async fn run_to_completion(argv: &[String], timeout: Duration) -> Result<String, CliError> {
    let (mut child, stdout) = spawn_process(argv)?;
    let stdout = PipeCollector::spawn(Some(stdout));
    let stderr = PipeCollector::spawn(child.stderr.take());

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            stdout.abort();
            stderr.abort();
            return Err(CliError::Wait(e));
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "claude CLI timed out, killing");
            terminate(&mut child).await;
            let grace = Instant::now() + DRAIN_GRACE;
            let (out, err) = tokio::join!(stdout.finish(grace), stderr.finish(grace));
            debug!(stdout_len = out.len(), stderr_len = err.len(), "discarded output of timed-out run");
            return Err(CliError::Timeout { timeout });
        }
    };

    let grace = Instant::now() + DRAIN_GRACE;
    let (stdout, stderr) = tokio::join!(stdout.finish(grace), stderr.finish(grace));

    if !status.success() {
        return Err(exit_error(status.code(), &stderr));
    }
    Ok(stdout)
}

/// Reads a pipe to EOF on its own task.
///
/// Bytes land in a buffer shared with the owner, so cutting the task short
/// keeps everything read so far. A grandchild that inherited the pipe can
/// hold it open long after the CLI itself is gone.
struct PipeCollector {
    buf: Arc<Mutex<Vec<u8>>>,
    task: JoinHandle<()>,
}

impl PipeCollector {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let task = tokio::spawn(async move {
            let Some(mut pipe) = pipe else { return };
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .extend_from_slice(&chunk[..n]),
                    Err(e) => {
                        debug!(error = %e, "pipe read ended with error");
                        break;
                    }
                }
            }
        });
        Self { buf, task }
    }

    /// Wait for EOF until `deadline`, then return what was read.
    async fn finish(mut self, deadline: Instant) -> String {
        match tokio::time::timeout_at(deadline, &mut self.task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "output collector task failed"),
            Err(_) => {
                self.task.abort();
                debug!("pipe still open after grace period, keeping partial output");
            }
        }
        let buf = self.buf.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn abort(&self) {
        self.task.abort();
    }
}

/// Read and discard whatever is still buffered in `reader`, until `deadline`.
async fn drain<R: AsyncRead + Unpin>(reader: &mut R, deadline: Instant) {
    let mut sink = tokio::io::sink();
    match tokio::time::timeout_at(deadline, tokio::io::copy(reader, &mut sink)).await {
        Ok(Ok(bytes)) => debug!(bytes, "discarded leftover output"),
        Ok(Err(e)) => debug!(error = %e, "drain ended with error"),
        Err(_) => debug!("drain gave up, pipe still open"),
    }
}

/// SIGKILL the child and reap it.
async fn terminate(child: &mut Child) {
    if let Err(e) = child.kill().await {
        debug!(error = %e, "kill failed, process already gone");
    }
}

fn exit_error(code: Option<i32>, stderr: &str) -> CliError {
    let stderr = stderr.trim();
    CliError::Exit {
        code,
        message: if stderr.is_empty() {
            UNKNOWN_ERROR.to_string()
        } else {
            stderr.to_string()
        },
    }
}

fn format_duration(d: &Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use relay_core::types::EventKind;

    #[test]
    fn default_timeout_is_120_seconds() {
        let client = ClaudeCliClient::default();
        assert_eq!(client.timeout(), Duration::from_secs(120));
        assert_eq!(client.command(), "claude");
    }

    #[test]
    fn invocation_without_token_or_streaming() {
        let client = ClaudeCliClient::new("claude");
        let argv = client.invocation("hello", None, false);
        assert_eq!(argv, vec!["claude", "-p", "hello"]);
    }

    #[test]
    fn invocation_with_resume_token() {
        let client = ClaudeCliClient::new("claude");
        let argv = client.invocation("hi", Some("abc-123"), false);
        assert_eq!(argv, vec!["claude", "-p", "hi", "--resume", "abc-123"]);
    }

    #[test]
    fn invocation_in_streaming_mode() {
        let client = ClaudeCliClient::new("claude");
        let argv = client.invocation("hi", Some("t"), true);
        assert_eq!(
            argv,
            vec![
                "claude",
                "-p",
                "hi",
                "--resume",
                "t",
                "--output-format",
                "stream-json",
                "--verbose"
            ]
        );
    }

    #[test]
    fn launcher_args_precede_prompt_flag() {
        let client = ClaudeCliClient::new("npx")
            .with_command_args(vec!["@anthropic-ai/claude-code".to_string()]);
        let argv = client.invocation("hi", None, false);
        assert_eq!(argv, vec!["npx", "@anthropic-ai/claude-code", "-p", "hi"]);
    }

    #[test]
    fn from_config_copies_every_field() {
        let config = ClaudeConfig {
            command: "/opt/claude".to_string(),
            command_args: vec!["--debug".to_string()],
            timeout_secs: 7,
        };
        let client = ClaudeCliClient::from_config(&config);
        assert_eq!(client.command(), "/opt/claude");
        assert_eq!(client.timeout(), Duration::from_secs(7));
        assert_eq!(client.invocation("x", None, false)[1], "--debug");
    }

    #[test]
    fn error_messages_are_human_readable() {
        let timeout = CliError::Timeout {
            timeout: Duration::from_secs(120),
        };
        assert_eq!(timeout.to_string(), "response timed out after 120s");

        let short = CliError::Timeout {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(short.to_string(), "response timed out after 250ms");

        assert_eq!(
            exit_error(Some(1), "  \n").to_string(),
            "claude CLI error: unknown error"
        );
        assert_eq!(
            exit_error(Some(2), "bad flag\n").to_string(),
            "claude CLI error: bad flag"
        );
    }

    #[tokio::test]
    async fn send_reports_missing_binary() {
        let client = ClaudeCliClient::new("/nonexistent/bin/claude-relay-missing");
        let outcome = client.send("hello", Some("tok")).await;

        assert!(!outcome.success);
        assert!(outcome.text.is_empty());
        assert_eq!(outcome.continuation_token.as_deref(), Some("tok"));
        let err = outcome.error.unwrap();
        assert!(err.contains("not found"), "got: {err}");
        assert!(err.contains("installation"), "got: {err}");
    }

    #[tokio::test]
    async fn stream_yields_single_error_for_missing_binary() {
        let client = ClaudeCliClient::new("/nonexistent/bin/claude-relay-missing");
        let events: Vec<_> = client.stream("hello", None).collect().await;

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Error);
        assert!(events[0].text.contains("check the installation"));
    }
}
