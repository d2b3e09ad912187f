//! Background removal of abandoned sessions.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::registry::SessionRegistry;

/// Periodically drop sessions nobody subscribed to within the session TTL
pub fn spawn_reaper(
    registry: Arc<SessionRegistry>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_seconds = interval.as_secs(), "Session reaper started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    registry.reap_idle();
                }
            }
        }

        info!("Session reaper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::events::StreamEvent;

    #[tokio::test(start_paused = true)]
    async fn test_reaper_task_collects_and_stops() {
        let registry = Arc::new(SessionRegistry::new(&RelayConfig {
            session_ttl_seconds: 30,
            ..RelayConfig::default()
        }));
        registry.post_event("gone", StreamEvent::progress("x")).unwrap();

        let shutdown = CancellationToken::new();
        let handle = spawn_reaper(
            Arc::clone(&registry),
            Duration::from_secs(5),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_secs(40)).await;
        assert_eq!(registry.session_count(), 0);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
