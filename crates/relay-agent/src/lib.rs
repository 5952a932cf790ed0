//! relay-agent: drives the claude CLI and turns its output into relay events.
//!
//! - [`stream`]: lenient line parser for `--output-format stream-json`.
//! - [`claude_cli`]: process supervision (spawn, deadline, kill, drain).
//! - [`pipeline`]: one user turn, from session lookup to final flush.

pub mod claude_cli;
pub mod pipeline;
pub mod stream;

pub use claude_cli::{ClaudeCliClient, CliError, EventStream, GenerationBackend, ProcessOutcome};
pub use pipeline::{run_turn, TurnSummary};
pub use stream::parse_line;
