use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Handle to a message that was posted or edited.
///
/// `content` is the body the platform accepted, which is what the relay
/// concatenates to reconstruct everything it delivered in a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Platform-native message id.
    pub id: u64,
    pub content: String,
}

/// A place the relay can post messages to and later edit them.
///
/// Both operations are expected to fail when `text` exceeds the platform's
/// length ceiling; the relay never asks for more than its configured maximum.
#[async_trait]
pub trait OutboundChannel: Send + Sync {
    /// Post `text` as a new message.
    async fn post(&self, text: &str) -> Result<SentMessage, ChannelError>;

    /// Replace the body of `message` with `text`.
    async fn edit(&self, message: &SentMessage, text: &str) -> Result<SentMessage, ChannelError>;
}
