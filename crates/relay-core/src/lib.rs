pub mod config;
pub mod error;
pub mod types;

pub use error::{RelayError, Result};
pub use types::{EventKind, Role, StreamEvent};
