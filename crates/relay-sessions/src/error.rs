use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session is tracked for this user.
    #[error("session not found: {user_id}")]
    NotFound { user_id: String },

    /// The session is in the middle of a turn and cannot be touched.
    #[error("session busy: {user_id}")]
    Busy { user_id: String },
}

pub type Result<T> = std::result::Result<T, SessionError>;
