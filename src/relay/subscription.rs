//! Live, non-restartable read side of a session.

use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::registry::SessionRegistry;
use super::session::{ReadResult, SessionQueue};
use super::RelayError;
use crate::events::StreamEvent;

/// Why a subscription stopped yielding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Terminal,
    IdleTimeout,
}

/// A subscriber's cursor into one session.
///
/// Dropping the subscription detaches it from the session; the session is
/// removed once its last subscriber is gone.
#[derive(Debug)]
pub struct Subscription {
    registry: Arc<SessionRegistry>,
    queue: Arc<SessionQueue>,
    cursor: u64,
    idle_timeout: Duration,
    deadline: Instant,
    closed: Option<CloseReason>,
}

impl Subscription {
    pub(crate) fn new(
        registry: Arc<SessionRegistry>,
        queue: Arc<SessionQueue>,
        idle_timeout: Duration,
    ) -> Self {
        let cursor = queue.first_cursor();
        Self {
            registry,
            queue,
            cursor,
            idle_timeout,
            deadline: Instant::now() + idle_timeout,
            closed: None,
        }
    }

    pub fn session_id(&self) -> &str {
        self.queue.session_id()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        self.closed
    }

    /// Wait for the next event.
    ///
    /// Returns `None` after a terminal event has been yielded, and a single
    /// `Err(IdleTimeout)` when nothing arrives within the idle window.
    pub async fn next_event(&mut self) -> Option<Result<StreamEvent, RelayError>> {
        if self.closed.is_some() {
            return None;
        }

        let queue = Arc::clone(&self.queue);
        loop {
            let notified = queue.notified();
            tokio::pin!(notified);
            // Register interest before reading so a post between read and wait still wakes us
            notified.as_mut().enable();

            match queue.read_from(self.cursor) {
                ReadResult::Event {
                    event,
                    next_cursor,
                    skipped,
                } => {
                    if skipped > 0 {
                        self.registry.stats().record_lagged(skipped);
                        warn!(
                            session_id = %queue.session_id(),
                            skipped,
                            "Subscriber fell behind eviction, skipping to oldest retained event"
                        );
                    }
                    self.cursor = next_cursor;
                    self.deadline = Instant::now() + self.idle_timeout;
                    if event.is_terminal() {
                        self.closed = Some(CloseReason::Terminal);
                    }
                    return Some(Ok(event));
                }
                ReadResult::Ended => {
                    self.closed = Some(CloseReason::Terminal);
                    return None;
                }
                ReadResult::Pending => {}
            }

            if tokio::time::timeout_at(self.deadline, notified).await.is_err() {
                self.closed = Some(CloseReason::IdleTimeout);
                self.registry.stats().record_timeout();
                debug!(
                    session_id = %queue.session_id(),
                    idle_seconds = self.idle_timeout.as_secs(),
                    "Subscription idle timeout"
                );
                return Some(Err(RelayError::IdleTimeout {
                    session_id: queue.session_id().to_string(),
                    idle: self.idle_timeout,
                }));
            }
        }
    }

    /// Adapt into a `Stream`; dropping the stream ends the subscription
    pub fn into_stream(self) -> impl Stream<Item = Result<StreamEvent, RelayError>> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription
                .next_event()
                .await
                .map(|item| (item, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.release(&self.queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use futures::StreamExt;
    use serde_json::json;

    fn registry(idle_timeout_seconds: u64) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(&RelayConfig {
            idle_timeout_seconds,
            ..RelayConfig::default()
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_without_any_event() {
        let registry = registry(300);
        let mut subscription = registry.subscribe("quiet").unwrap();

        let started = Instant::now();
        let item = subscription.next_event().await.unwrap();
        let waited = started.elapsed();

        assert!(matches!(item, Err(RelayError::IdleTimeout { .. })));
        assert!(waited >= Duration::from_secs(300));
        assert!(waited < Duration::from_secs(301));
        assert_eq!(subscription.close_reason(), Some(CloseReason::IdleTimeout));
        assert!(subscription.next_event().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_window_restarts_after_each_event() {
        let registry = registry(10);
        let mut subscription = registry.subscribe("s1").unwrap();

        let producer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(8)).await;
                registry.post_event("s1", StreamEvent::progress("late but in time")).unwrap();
            })
        };

        let started = Instant::now();
        assert!(subscription.next_event().await.unwrap().is_ok());
        producer.await.unwrap();

        let err = subscription.next_event().await.unwrap().unwrap_err();
        assert_eq!(err.code(), "idle_timeout");
        let total = started.elapsed();
        assert!(total >= Duration::from_secs(18));
        assert!(total < Duration::from_secs(19));
        assert_eq!(registry.stats().snapshot().subscriptions_timed_out, 1);
    }

    #[tokio::test]
    async fn test_stream_adapter_closes_on_terminal() {
        let registry = registry(300);
        registry.post_event("s1", StreamEvent::progress("a")).unwrap();
        registry
            .post_event("s1", StreamEvent::terminal_success(json!({"rows": 1})))
            .unwrap();

        let stream = registry.subscribe("s1").unwrap().into_stream();
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| item.is_ok()));
        // the only subscriber went away with the stream
        assert_eq!(registry.session_count(), 0);
    }
}
