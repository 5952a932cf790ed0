//! In-memory [`OutboundChannel`] that records every call.
//!
//! Used by the relay and pipeline tests, and handy for dry runs where no chat
//! platform is available.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::channel::{OutboundChannel, SentMessage};
use crate::error::ChannelError;

/// One network call as seen by the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOp {
    Post { id: u64, text: String },
    Edit { id: u64, text: String },
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    /// Current body of every message, in posting order.
    messages: Vec<SentMessage>,
    ops: Vec<ChannelOp>,
    failing_posts: usize,
}

#[derive(Debug, Default)]
pub struct RecordingChannel {
    max_chars: Option<usize>,
    state: Mutex<State>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject bodies longer than `max` characters, like a real platform would.
    pub fn with_max_chars(max: usize) -> Self {
        Self {
            max_chars: Some(max),
            state: Mutex::default(),
        }
    }

    /// Make the next `n` posts fail with [`ChannelError::SendFailed`].
    pub fn fail_next_posts(&self, n: usize) {
        self.lock().failing_posts = n;
    }

    pub fn ops(&self) -> Vec<ChannelOp> {
        self.lock().ops.clone()
    }

    pub fn network_calls(&self) -> usize {
        self.lock().ops.len()
    }

    /// Current bodies of all messages, in posting order.
    pub fn contents(&self) -> Vec<String> {
        self.lock()
            .messages
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_len(&self, text: &str) -> Result<(), ChannelError> {
        if let Some(max) = self.max_chars {
            let len = text.chars().count();
            if len > max {
                return Err(ChannelError::TooLong { len, max });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl OutboundChannel for RecordingChannel {
    async fn post(&self, text: &str) -> Result<SentMessage, ChannelError> {
        self.check_len(text)?;
        let mut state = self.lock();
        if state.failing_posts > 0 {
            state.failing_posts -= 1;
            return Err(ChannelError::SendFailed("injected failure".to_string()));
        }

        state.next_id += 1;
        let sent = SentMessage {
            id: state.next_id,
            content: text.to_string(),
        };
        state.ops.push(ChannelOp::Post {
            id: sent.id,
            text: text.to_string(),
        });
        state.messages.push(sent.clone());
        Ok(sent)
    }

    async fn edit(&self, message: &SentMessage, text: &str) -> Result<SentMessage, ChannelError> {
        self.check_len(text)?;
        let mut state = self.lock();
        let Some(existing) = state.messages.iter_mut().find(|m| m.id == message.id) else {
            return Err(ChannelError::EditFailed {
                id: message.id,
                reason: "unknown message".to_string(),
            });
        };

        existing.content = text.to_string();
        let sent = existing.clone();
        state.ops.push(ChannelOp::Edit {
            id: message.id,
            text: text.to_string(),
        });
        Ok(sent)
    }
}
