use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use relay_agent::ClaudeCliClient;
use relay_channels::RelaySettings;
use relay_core::config::RelayBotConfig;
use relay_discord::{DiscordAdapter, RelayContext};
use relay_sessions::SessionStore;

mod ask;
mod cli;
mod sweeper;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.default_filter().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // load config: explicit path > RELAY_CONFIG env > ~/.claude-relay/relay.toml
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("RELAY_CONFIG").ok());
    let config = RelayBotConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        RelayBotConfig::default()
    });

    let client = ClaudeCliClient::from_config(&config.claude);
    if which::which(client.command()).is_err() {
        warn!(
            command = %client.command(),
            "claude CLI not found on PATH, every turn will fail until it is installed"
        );
    }

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_bot(config, client).await,
        Command::Ask {
            text,
            resume,
            stream,
        } => ask::run(&client, &text, resume.as_deref(), stream).await,
    }
}

async fn run_bot(config: RelayBotConfig, client: ClaudeCliClient) -> anyhow::Result<()> {
    let discord = config.discord.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "no [discord] section configured (set RELAY_DISCORD__BOT_TOKEN and RELAY_DISCORD__GUILD_ID)"
        )
    })?;

    let sessions = Arc::new(SessionStore::from_config(&config.sessions));
    let sweeper = sweeper::spawn(Arc::clone(&sessions), &config.sessions);

    let relay = RelayContext::new(
        Arc::new(client),
        Arc::clone(&sessions),
        RelaySettings::from(&config.relay),
    );
    let adapter = DiscordAdapter::new(&discord, relay);

    info!(
        guild_id = discord.guild_id,
        timeout_secs = config.claude.timeout_secs,
        "relay bot starting"
    );

    let result = tokio::select! {
        res = adapter.run() => res.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            info!(active_sessions = sessions.active_count(), "shutting down");
            Ok(())
        }
    };
    sweeper.abort();
    result
}
