//! Shared state handed to every Discord event.

use std::sync::Arc;

use relay_agent::GenerationBackend;
use relay_channels::RelaySettings;
use relay_sessions::SessionStore;

/// What a turn needs besides the message itself.
///
/// Cloned into each spawned turn task; everything inside is reference-counted
/// or `Copy`.
#[derive(Clone)]
pub struct RelayContext {
    pub backend: Arc<dyn GenerationBackend>,
    pub sessions: Arc<SessionStore>,
    pub settings: RelaySettings,
}

impl RelayContext {
    pub fn new(
        backend: Arc<dyn GenerationBackend>,
        sessions: Arc<SessionStore>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            backend,
            sessions,
            settings,
        }
    }
}
