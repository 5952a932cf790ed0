pub mod channel;
pub mod error;
pub mod recording;
pub mod relay;

pub use channel::{OutboundChannel, SentMessage};
pub use error::ChannelError;
pub use recording::{ChannelOp, RecordingChannel};
pub use relay::{RelayPhase, RelaySettings, StreamRelay};
