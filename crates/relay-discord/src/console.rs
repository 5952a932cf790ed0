//! Private per-user "console" channels, the only place the bot answers.
//!
//! Layout: one category (default `🤖 Bot Consoles`) holding a text channel
//! `bot-console-<username>` per member. Each console hides from `@everyone`
//! and is readable by its member and the bot.

use std::collections::HashMap;

use serenity::builder::CreateChannel;
use serenity::http::Http;
use serenity::model::channel::{ChannelType, GuildChannel, PermissionOverwrite, PermissionOverwriteType};
use serenity::model::guild::Member;
use serenity::model::id::{ChannelId, GuildId, UserId};
use serenity::model::Permissions;
use tracing::{debug, info};

use relay_core::config::{DiscordConfig, DEFAULT_CONSOLE_CATEGORY, DEFAULT_CONSOLE_PREFIX};

use crate::error::DiscordError;

/// Discord caps a single member-list page at this many entries.
const MEMBER_PAGE: u64 = 1000;

/// Result of [`ConsoleChannels::ensure_console`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Console {
    pub channel_id: ChannelId,
    /// The channel did not exist before this call.
    pub created: bool,
}

/// Snapshot of the guild's categories and text channels by name.
///
/// Fetched once per provisioning pass and kept current as channels are
/// created, so provisioning costs one channel-list request regardless of
/// member count.
#[derive(Debug, Clone, Default)]
pub struct GuildChannels {
    categories: HashMap<String, ChannelId>,
    texts: HashMap<(ChannelId, String), ChannelId>,
}

impl GuildChannels {
    pub async fn fetch(http: &Http, guild_id: GuildId) -> Result<Self, DiscordError> {
        let channels = guild_id.channels(http).await?;
        Ok(Self::from_channels(channels.values()))
    }

    pub fn from_channels<'a>(channels: impl IntoIterator<Item = &'a GuildChannel>) -> Self {
        let mut index = Self::default();
        for channel in channels {
            match (channel.kind, channel.parent_id) {
                (ChannelType::Category, _) => index.add_category(&channel.name, channel.id),
                (ChannelType::Text, Some(parent)) => index.add_text(parent, &channel.name, channel.id),
                _ => {}
            }
        }
        index
    }

    pub fn category(&self, name: &str) -> Option<ChannelId> {
        self.categories.get(name).copied()
    }

    /// Text channel `name` under `category_id`.
    pub fn text(&self, category_id: ChannelId, name: &str) -> Option<ChannelId> {
        self.texts.get(&(category_id, name.to_string())).copied()
    }

    pub fn add_category(&mut self, name: &str, id: ChannelId) {
        self.categories.entry(name.to_string()).or_insert(id);
    }

    pub fn add_text(&mut self, category_id: ChannelId, name: &str, id: ChannelId) {
        self.texts.entry((category_id, name.to_string())).or_insert(id);
    }
}

#[derive(Debug, Clone)]
pub struct ConsoleChannels {
    category: String,
    prefix: String,
}

impl Default for ConsoleChannels {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CATEGORY, DEFAULT_CONSOLE_PREFIX)
    }
}

impl ConsoleChannels {
    pub fn new(category: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &DiscordConfig) -> Self {
        Self::new(&config.console_category, &config.console_prefix)
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// Channel name for `username`, normalized the way Discord stores text
    /// channel names (lowercase, whitespace replaced by `-`).
    pub fn channel_name(&self, username: &str) -> String {
        let slug: String = username
            .trim()
            .chars()
            .map(|c| if c.is_whitespace() { '-' } else { c })
            .flat_map(char::to_lowercase)
            .collect();
        format!("{}{}", self.prefix, slug)
    }

    pub fn is_console_channel(&self, channel_name: &str) -> bool {
        channel_name.starts_with(&self.prefix)
    }

    pub fn topic(username: &str) -> String {
        format!("{username}'s AI conversation channel")
    }

    pub fn greeting(user_id: UserId) -> String {
        format!(
            "\u{1f44b} <@{}>, this is your AI console.\nSend a message here and the assistant will reply.",
            user_id.get()
        )
    }

    /// Find the console category, creating it if absent.
    pub async fn ensure_category(
        &self,
        http: &Http,
        guild_id: GuildId,
        channels: &mut GuildChannels,
    ) -> Result<ChannelId, DiscordError> {
        if let Some(existing) = channels.category(&self.category) {
            return Ok(existing);
        }

        let category = guild_id
            .create_channel(http, CreateChannel::new(&self.category).kind(ChannelType::Category))
            .await?;
        info!(category = %self.category, id = %category.id, "console category created");
        channels.add_category(&self.category, category.id);
        Ok(category.id)
    }

    /// Return the member's console, creating it with private permissions if
    /// it does not exist yet.
    pub async fn ensure_console(
        &self,
        http: &Http,
        guild_id: GuildId,
        channels: &mut GuildChannels,
        category_id: ChannelId,
        member: &Member,
        bot_id: UserId,
    ) -> Result<Console, DiscordError> {
        let name = self.channel_name(&member.user.name);
        if let Some(existing) = channels.text(category_id, &name) {
            debug!(channel = %name, "console already exists");
            return Ok(Console {
                channel_id: existing,
                created: false,
            });
        }

        let builder = CreateChannel::new(&name)
            .kind(ChannelType::Text)
            .category(category_id)
            .topic(Self::topic(&member.user.name))
            .permissions(private_overwrites(guild_id, member.user.id, bot_id));
        let channel = guild_id.create_channel(http, builder).await?;

        info!(channel = %name, id = %channel.id, "console created");
        channels.add_text(category_id, &name, channel.id);
        Ok(Console {
            channel_id: channel.id,
            created: true,
        })
    }
}

/// `@everyone` denied, the member and the bot allowed.
fn private_overwrites(guild_id: GuildId, member: UserId, bot: UserId) -> Vec<PermissionOverwrite> {
    vec![
        PermissionOverwrite {
            allow: Permissions::empty(),
            deny: Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES,
            kind: PermissionOverwriteType::Role(guild_id.everyone_role()),
        },
        PermissionOverwrite {
            allow: Permissions::VIEW_CHANNEL
                | Permissions::SEND_MESSAGES
                | Permissions::READ_MESSAGE_HISTORY
                | Permissions::ATTACH_FILES,
            deny: Permissions::empty(),
            kind: PermissionOverwriteType::Member(member),
        },
        PermissionOverwrite {
            allow: Permissions::VIEW_CHANNEL
                | Permissions::SEND_MESSAGES
                | Permissions::READ_MESSAGE_HISTORY
                | Permissions::MANAGE_MESSAGES,
            deny: Permissions::empty(),
            kind: PermissionOverwriteType::Member(bot),
        },
    ]
}

/// Every member of the guild, following Discord's pagination.
pub async fn fetch_members(http: &Http, guild_id: GuildId) -> Result<Vec<Member>, DiscordError> {
    let mut all = Vec::new();
    let mut after: Option<UserId> = None;
    loop {
        let page = guild_id.members(http, Some(MEMBER_PAGE), after).await?;
        let len = page.len() as u64;
        after = page.last().map(|m| m.user.id);
        all.extend(page);
        if len < MEMBER_PAGE {
            break;
        }
    }
    Ok(all)
}
