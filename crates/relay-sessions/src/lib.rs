pub mod error;
pub mod manager;
pub mod types;

pub use error::SessionError;
pub use manager::{SessionHandle, SessionStore};
pub use types::{ConversationMessage, Session};
