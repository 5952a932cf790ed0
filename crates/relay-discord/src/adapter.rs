use std::time::Duration;

use serenity::model::gateway::GatewayIntents;
use serenity::model::id::GuildId;
use serenity::Client;
use tracing::{error, info, warn};

use relay_core::config::DiscordConfig;

use crate::console::ConsoleChannels;
use crate::context::RelayContext;
use crate::error::DiscordError;
use crate::handler::DiscordHandler;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Discord front end.
///
/// Wraps a serenity `Client` and reconnects whenever the gateway drops.
pub struct DiscordAdapter {
    relay: RelayContext,
    config: DiscordConfig,
}

impl DiscordAdapter {
    pub fn new(config: &DiscordConfig, relay: RelayContext) -> Self {
        Self {
            relay,
            config: config.clone(),
        }
    }

    /// Gateway intents the bot needs: guild channels, the member list for
    /// console provisioning, and message text.
    pub fn intents() -> GatewayIntents {
        GatewayIntents::GUILDS
            | GatewayIntents::GUILD_MEMBERS
            | GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT
    }

    /// Connect to Discord and keep reconnecting whenever the gateway drops.
    ///
    /// Only returns early on a missing bot token or a zero guild id.
    pub async fn run(self) -> Result<(), DiscordError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(DiscordError::NoToken);
        }
        if self.config.guild_id == 0 {
            return Err(DiscordError::InvalidGuild(0));
        }

        loop {
            let mut client = self.connect().await;
            info!(guild_id = self.config.guild_id, "Discord: gateway connecting");

            if let Err(e) = client.start().await {
                warn!("Discord: gateway error ({e}), reconnecting in 5s");
            } else {
                info!("Discord: gateway stopped cleanly, reconnecting in 5s");
            }

            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    /// Build a client, retrying until it succeeds.
    async fn connect(&self) -> Client {
        loop {
            match self.build_client().await {
                Ok(client) => return client,
                Err(e) => {
                    error!("Discord: connect failed ({e}), retrying in 30s");
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn build_client(&self) -> Result<Client, serenity::Error> {
        let handler = DiscordHandler::new(
            self.relay.clone(),
            GuildId::new(self.config.guild_id),
            ConsoleChannels::from_config(&self.config),
        );

        Client::builder(&self.config.bot_token, Self::intents())
            .event_handler(handler)
            .await
    }
}
