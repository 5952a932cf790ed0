pub mod adapter;
pub mod channel;
pub mod commands;
pub mod console;
pub mod context;
pub mod error;
pub mod handler;

pub use adapter::DiscordAdapter;
pub use channel::DiscordChannel;
pub use console::{ConsoleChannels, GuildChannels};
pub use context::RelayContext;
pub use error::DiscordError;
