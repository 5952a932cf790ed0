use clap::{Parser, Subcommand};

/// Relay Claude Code CLI conversations into private Discord channels
#[derive(Debug, Parser)]
#[command(name = "relay-bot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: $RELAY_CONFIG, then ~/.claude-relay/relay.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<String>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the Discord bot (default)
    Run,

    /// Send one prompt to the CLI and print the reply
    Ask {
        /// Prompt text
        text: String,

        /// Continue an earlier CLI session
        #[arg(long, value_name = "TOKEN")]
        resume: Option<String>,

        /// Print text as it streams in
        #[arg(long)]
        stream: bool,
    },
}

impl Cli {
    /// Log filter used when `RUST_LOG` is unset.
    pub fn default_filter(&self) -> &'static str {
        match self.verbose {
            0 => "relay_bot=info,relay_agent=info,relay_discord=info",
            1 => "relay_bot=debug,relay_agent=debug,relay_channels=debug,relay_sessions=debug,relay_discord=debug",
            _ => "relay_bot=trace,relay_agent=trace,relay_channels=trace,relay_sessions=trace,relay_discord=trace",
        }
    }
}
