use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use relay_core::config::{SessionsConfig, DEFAULT_MAX_HISTORY};

use crate::error::{Result, SessionError};
use crate::types::Session;

/// Shared handle to one user's session. Hold the lock for a whole turn.
pub type SessionHandle = Arc<Mutex<Session>>;

/// In-memory sessions keyed by user id.
///
/// Each session sits behind its own async mutex, so turns from the same user
/// are serialized while different users never contend. Nothing is persisted;
/// a restart forgets every continuation token.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
    max_history: usize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_max_history(DEFAULT_MAX_HISTORY)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions created by this store keep at most `max_history` messages.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_history,
        }
    }

    pub fn from_config(config: &SessionsConfig) -> Self {
        Self::with_max_history(config.max_history)
    }

    /// Return the user's session, creating an empty one on first contact.
    #[instrument(skip(self))]
    pub fn get_or_create(&self, user_id: &str) -> SessionHandle {
        if let Some(existing) = self.sessions.get(user_id) {
            return Arc::clone(existing.value());
        }

        let entry = self.sessions.entry(user_id.to_string()).or_insert_with(|| {
            debug!("session created");
            Arc::new(Mutex::new(Session::with_history_limit(
                user_id,
                self.max_history,
            )))
        });
        Arc::clone(entry.value())
    }

    pub fn get(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions.get(user_id).map(|s| Arc::clone(s.value()))
    }

    /// Forget a user's session entirely.
    #[instrument(skip(self))]
    pub fn remove(&self, user_id: &str) -> Result<()> {
        self.sessions
            .remove(user_id)
            .map(|_| ())
            .ok_or_else(|| SessionError::NotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Reset history and token without dropping the session.
    #[instrument(skip(self))]
    pub fn clear(&self, user_id: &str) -> Result<()> {
        let handle = self.get(user_id).ok_or_else(|| SessionError::NotFound {
            user_id: user_id.to_string(),
        })?;
        let mut session = handle.try_lock().map_err(|_| SessionError::Busy {
            user_id: user_id.to_string(),
        })?;
        session.clear();
        Ok(())
    }

    /// Drop sessions idle for longer than `ttl`. Returns how many were removed.
    ///
    /// Sessions locked by an in-flight turn are kept regardless of age.
    #[instrument(skip(self), fields(ttl_secs = ttl.as_secs()))]
    pub fn cleanup_older_than(&self, ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let now = Utc::now();
        let mut removed = 0;

        self.sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) if session.idle_for(now) > ttl => {
                removed += 1;
                false
            }
            _ => true,
        });

        if removed > 0 {
            info!(removed, remaining = self.sessions.len(), "expired sessions swept");
        }
        removed
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
