use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use relay_core::config::SessionsConfig;
use relay_sessions::SessionStore;

/// Periodically drop sessions idle for longer than the configured TTL.
pub fn spawn(sessions: Arc<SessionStore>, config: &SessionsConfig) -> JoinHandle<()> {
    let ttl = Duration::from_secs(config.ttl_hours.saturating_mul(3600));
    let period = Duration::from_secs(config.sweep_interval_secs.max(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = sessions.cleanup_older_than(ttl);
            debug!(removed, active = sessions.active_count(), "session sweep");
        }
    })
}
