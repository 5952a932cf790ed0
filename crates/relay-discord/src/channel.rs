use std::sync::Arc;

use async_trait::async_trait;
use serenity::builder::EditMessage;
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use tracing::debug;

use relay_channels::{ChannelError, OutboundChannel, SentMessage};

/// A Discord text channel as a relay target.
///
/// Uses the REST client only, so it keeps working across gateway reconnects.
#[derive(Clone)]
pub struct DiscordChannel {
    http: Arc<Http>,
    channel_id: ChannelId,
}

impl DiscordChannel {
    pub fn new(http: Arc<Http>, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl OutboundChannel for DiscordChannel {
    async fn post(&self, text: &str) -> Result<SentMessage, ChannelError> {
        let msg = self
            .channel_id
            .say(&self.http, text)
            .await
            .map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        debug!(channel_id = %self.channel_id, message_id = %msg.id, "posted");
        Ok(SentMessage {
            id: msg.id.get(),
            content: text.to_string(),
        })
    }

    async fn edit(&self, message: &SentMessage, text: &str) -> Result<SentMessage, ChannelError> {
        let id = MessageId::new(message.id);
        self.channel_id
            .edit_message(&self.http, id, EditMessage::new().content(text))
            .await
            .map_err(|e| ChannelError::EditFailed {
                id: message.id,
                reason: e.to_string(),
            })?;

        Ok(SentMessage {
            id: message.id,
            content: text.to_string(),
        })
    }
}
