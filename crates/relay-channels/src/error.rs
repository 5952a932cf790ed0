use thiserror::Error;

/// Errors that can occur within any outbound channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A message could not be delivered to the remote endpoint.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// An existing message could not be edited.
    #[error("Edit failed for message {id}: {reason}")]
    EditFailed { id: u64, reason: String },

    /// The body exceeds what the platform accepts.
    #[error("Message too long: {len} chars (max {max})")]
    TooLong { len: usize, max: usize },
}
