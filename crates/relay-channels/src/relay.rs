//! Incremental delivery of streamed text into size-capped, rate-limited messages.
//!
//! A [`StreamRelay`] lives for exactly one turn. It buffers `TextDelta` text,
//! keeps one "active" message that it edits in place as the buffer grows,
//! and commits a full-size chunk whenever the buffer passes the per-message
//! ceiling. Messages are filled left to right and never reopened once a later
//! message exists.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use relay_core::config::RelayConfig;
use relay_core::types::{EventKind, StreamEvent};

use crate::channel::{OutboundChannel, SentMessage};
use crate::error::ChannelError;

/// Discord's hard limit on a message body.
pub const MAX_MESSAGE_CHARS: usize = 2000;
/// Discord starts rejecting edits to the same message faster than this.
pub const MIN_EDIT_INTERVAL: Duration = Duration::from_secs(1);

const WARNING_PREFIX: &str = "\u{26a0}\u{fe0f} ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    pub max_message_chars: usize,
    pub min_edit_interval: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            max_message_chars: MAX_MESSAGE_CHARS,
            min_edit_interval: MIN_EDIT_INTERVAL,
        }
    }
}

impl From<&RelayConfig> for RelaySettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            // A zero ceiling would never make progress.
            max_message_chars: config.max_message_chars.max(1),
            min_edit_interval: Duration::from_millis(config.min_edit_interval_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    /// Nothing received yet.
    Idle,
    /// Text is buffered and possibly partially delivered.
    Accumulating,
    /// The final flush happened; later text is ignored.
    Flushed,
}

/// Per-turn relay state. Not shared across turns or users.
pub struct StreamRelay<'a, C: OutboundChannel + ?Sized> {
    channel: &'a C,
    settings: RelaySettings,
    /// Text not yet committed to a finished message.
    pending: String,
    /// `pending.chars().count()`, kept in step with `pending`.
    pending_chars: usize,
    /// Message currently showing (a prefix of) `pending`.
    active: Option<SentMessage>,
    last_edit: Option<Instant>,
    /// Every committed message of this turn, in order.
    sent: Vec<SentMessage>,
    phase: RelayPhase,
}

impl<'a, C: OutboundChannel + ?Sized> StreamRelay<'a, C> {
    pub fn new(channel: &'a C) -> Self {
        Self::with_settings(channel, RelaySettings::default())
    }

    pub fn with_settings(channel: &'a C, settings: RelaySettings) -> Self {
        Self {
            channel,
            settings,
            pending: String::new(),
            pending_chars: 0,
            active: None,
            last_edit: None,
            sent: Vec::new(),
            phase: RelayPhase::Idle,
        }
    }

    /// Apply one event, in arrival order.
    ///
    /// Buffer state only changes after the channel accepted a call, so an
    /// `Err` leaves every received character either delivered or still
    /// pending.
    pub async fn handle_event(&mut self, event: &StreamEvent) -> Result<(), ChannelError> {
        match event.kind {
            EventKind::TextDelta => self.push_text(&event.text).await,
            EventKind::Final => self.flush().await,
            EventKind::Error => self.post_warning(&event.text).await,
            EventKind::System | EventKind::Unknown => Ok(()),
        }
    }

    async fn push_text(&mut self, text: &str) -> Result<(), ChannelError> {
        if text.is_empty() {
            return Ok(());
        }
        if self.phase == RelayPhase::Flushed {
            debug!(len = text.len(), "text after final flush ignored");
            return Ok(());
        }

        self.pending.push_str(text);
        self.pending_chars += text.chars().count();
        self.phase = RelayPhase::Accumulating;

        let max = self.settings.max_message_chars;
        while self.pending_chars > max {
            let split = byte_offset(&self.pending, max);
            let chunk = &self.pending[..split];
            let committed = match &self.active {
                Some(active) => self.channel.edit(active, chunk).await?,
                None => self.channel.post(chunk).await?,
            };
            debug!(message_id = committed.id, "committed full message");

            self.sent.push(committed);
            self.active = None;
            self.pending.drain(..split);
            self.pending_chars -= max;
        }

        if let Some(last) = self.last_edit {
            if last.elapsed() < self.settings.min_edit_interval {
                return Ok(());
            }
        }

        let now = Instant::now();
        let message = self.write_pending().await?;
        self.active = Some(message);
        self.last_edit = Some(now);
        Ok(())
    }

    /// Deliver whatever is buffered, ignoring the edit interval.
    ///
    /// Called for `Final` events and by the turn pipeline once the stream
    /// ends, so a turn without a `result` line still delivers its text.
    pub async fn flush(&mut self) -> Result<(), ChannelError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let message = self.write_pending().await?;
        debug!(message_id = message.id, chars = self.pending_chars, "flushed");

        self.sent.push(message);
        self.active = None;
        self.pending.clear();
        self.pending_chars = 0;
        self.last_edit = Some(Instant::now());
        self.phase = RelayPhase::Flushed;
        Ok(())
    }

    /// Post `text` as a standalone warning. Pending text is left alone.
    async fn post_warning(&mut self, text: &str) -> Result<(), ChannelError> {
        let budget = self
            .settings
            .max_message_chars
            .saturating_sub(WARNING_PREFIX.chars().count());
        let body = format!("{WARNING_PREFIX}{}", &text[..byte_offset(text, budget)]);
        self.channel.post(&body).await?;
        Ok(())
    }

    /// Edit the active message to the whole buffer, or post it if none.
    async fn write_pending(&self) -> Result<SentMessage, ChannelError> {
        match &self.active {
            Some(active) => self.channel.edit(active, &self.pending).await,
            None => self.channel.post(&self.pending).await,
        }
    }

    /// Concatenated content of every committed message.
    pub fn full_text(&self) -> String {
        self.sent.iter().map(|m| m.content.as_str()).collect()
    }

    pub fn sent_messages(&self) -> &[SentMessage] {
        &self.sent
    }

    pub fn pending_text(&self) -> &str {
        &self.pending
    }

    pub fn active_message(&self) -> Option<&SentMessage> {
        self.active.as_ref()
    }

    pub fn phase(&self) -> RelayPhase {
        self.phase
    }
}

/// Byte index just past the first `chars` characters of `s`.
fn byte_offset(s: &str, chars: usize) -> usize {
    s.char_indices().nth(chars).map_or(s.len(), |(i, _)| i)
}
