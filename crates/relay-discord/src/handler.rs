use std::sync::{Arc, OnceLock};

use serenity::async_trait;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::{ChannelId, GuildId, UserId};
use serenity::prelude::{Context, EventHandler};
use tracing::{debug, info, warn};

use relay_agent::run_turn;

use crate::channel::DiscordChannel;
use crate::commands::ConsoleCommand;
use crate::console::{fetch_members, ConsoleChannels, GuildChannels};
use crate::context::RelayContext;
use crate::error::DiscordError;

/// Serenity event handler wired to the turn pipeline.
pub struct DiscordHandler {
    pub relay: RelayContext,
    pub guild_id: GuildId,
    pub consoles: ConsoleChannels,
    pub bot_id: OnceLock<UserId>,
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        self.bot_id.set(ready.user.id).ok();
        info!(name = %ready.user.name, guild_id = %self.guild_id, "Discord bot connected");

        match self.provision_consoles(&ctx.http, ready.user.id).await {
            Ok(created) => info!(created, "console channels ready"),
            Err(e) => warn!(error = %e, "console provisioning failed"),
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot || msg.guild_id != Some(self.guild_id) {
            return;
        }

        let channel_name = match msg.channel_id.to_channel(&ctx).await {
            Ok(channel) => channel.guild().map(|c| c.name),
            Err(e) => {
                debug!(error = %e, channel_id = %msg.channel_id, "channel lookup failed");
                None
            }
        };
        if !channel_name.is_some_and(|name| self.consoles.is_console_channel(&name)) {
            return;
        }

        let content = msg.content.trim().to_string();
        if content.is_empty() {
            return;
        }
        let user_id = msg.author.id.to_string();

        if let Some(command) = ConsoleCommand::parse(&content) {
            let reply = command.execute(&self.relay.sessions, &user_id);
            if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
                warn!(error = %e, "command reply failed");
            }
            return;
        }

        let _ = msg.channel_id.broadcast_typing(&ctx.http).await;

        let relay = self.relay.clone();
        let http = Arc::clone(&ctx.http);
        let channel_id = msg.channel_id;
        tokio::spawn(async move {
            process_message(relay, http, channel_id, user_id, content).await;
        });
    }
}

impl DiscordHandler {
    pub fn new(relay: RelayContext, guild_id: GuildId, consoles: ConsoleChannels) -> Self {
        Self {
            relay,
            guild_id,
            consoles,
            bot_id: OnceLock::new(),
        }
    }

    /// Make sure every human member has a console; greet the new ones.
    ///
    /// A failure for one member is logged and skipped. Returns how many
    /// consoles were created.
    async fn provision_consoles(&self, http: &Http, bot_id: UserId) -> Result<usize, DiscordError> {
        let mut channels = GuildChannels::fetch(http, self.guild_id).await?;
        let category_id = self
            .consoles
            .ensure_category(http, self.guild_id, &mut channels)
            .await?;
        let members = fetch_members(http, self.guild_id).await?;
        let mut created = 0;

        for member in members.iter().filter(|m| !m.user.bot) {
            let console = match self
                .consoles
                .ensure_console(http, self.guild_id, &mut channels, category_id, member, bot_id)
                .await
            {
                Ok(console) => console,
                Err(e) => {
                    warn!(error = %e, user = %member.user.name, "console creation failed");
                    continue;
                }
            };

            if console.created {
                created += 1;
                let greeting = ConsoleChannels::greeting(member.user.id);
                if let Err(e) = console.channel_id.say(http, greeting).await {
                    warn!(error = %e, user = %member.user.name, "greeting failed");
                }
            }
        }
        Ok(created)
    }
}

async fn process_message(
    relay: RelayContext,
    http: Arc<Http>,
    channel_id: ChannelId,
    user_id: String,
    content: String,
) {
    let channel = DiscordChannel::new(http, channel_id);
    let result = run_turn(
        relay.backend.as_ref(),
        &relay.sessions,
        &channel,
        relay.settings,
        &user_id,
        &content,
    )
    .await;

    match result {
        Ok(summary) => debug!(
            user_id = %user_id,
            messages = summary.messages_sent,
            failed = summary.failed,
            "Discord turn finished"
        ),
        Err(e) => warn!(error = %e, user_id = %user_id, "Discord delivery failed"),
    }
}
