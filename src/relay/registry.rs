//! Session registry: the relay's only shared state.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::session::{PostOutcome, SessionQueue};
use super::subscription::Subscription;
use super::{validate_session_id, RelayError};
use crate::config::RelayConfig;
use crate::events::StreamEvent;
use crate::logging::log_relay_operation;

/// Relay-wide counters
#[derive(Debug, Default)]
pub struct RelayStats {
    events_posted: AtomicU64,
    events_evicted: AtomicU64,
    events_discarded: AtomicU64,
    events_lagged: AtomicU64,
    subscriptions_opened: AtomicU64,
    subscriptions_timed_out: AtomicU64,
    sessions_reaped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayStatsSnapshot {
    pub events_posted: u64,
    pub events_evicted: u64,
    pub events_discarded: u64,
    pub events_lagged: u64,
    pub subscriptions_opened: u64,
    pub subscriptions_timed_out: u64,
    pub sessions_reaped: u64,
}

impl RelayStats {
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            events_posted: self.events_posted.load(Ordering::Relaxed),
            events_evicted: self.events_evicted.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            events_lagged: self.events_lagged.load(Ordering::Relaxed),
            subscriptions_opened: self.subscriptions_opened.load(Ordering::Relaxed),
            subscriptions_timed_out: self.subscriptions_timed_out.load(Ordering::Relaxed),
            sessions_reaped: self.sessions_reaped.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_lagged(&self, skipped: u64) {
        self.events_lagged.fetch_add(skipped, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.subscriptions_timed_out.fetch_add(1, Ordering::Relaxed);
    }
}

/// Maps session ids to their buffers
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SessionQueue>>,
    max_queue_depth: usize,
    idle_timeout: Duration,
    session_ttl: Duration,
    stats: RelayStats,
}

impl SessionRegistry {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            max_queue_depth: config.max_queue_depth,
            idle_timeout: config.idle_timeout(),
            session_ttl: config.session_ttl(),
            stats: RelayStats::default(),
        }
    }

    /// Enqueue an event for a session, creating the session if needed.
    ///
    /// Succeeds whether or not anyone is subscribed.
    pub fn post_event(
        &self,
        session_id: &str,
        event: StreamEvent,
    ) -> Result<PostOutcome, RelayError> {
        validate_session_id(session_id)?;
        let event_type = event.event_type;

        // Push while holding the map guard so a concurrent release cannot
        // orphan the queue between lookup and push.
        let outcome = match self.sessions.get(session_id) {
            Some(queue) => queue.push(event),
            None => self
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(SessionQueue::new(session_id, self.max_queue_depth)))
                .push(event),
        };

        match outcome {
            PostOutcome::Buffered { evicted_oldest } => {
                self.stats.events_posted.fetch_add(1, Ordering::Relaxed);
                if evicted_oldest {
                    self.stats.events_evicted.fetch_add(1, Ordering::Relaxed);
                    debug!(session_id = %session_id, "Session buffer full, evicted oldest event");
                }
            }
            PostOutcome::DiscardedAfterTerminal => {
                self.stats.events_discarded.fetch_add(1, Ordering::Relaxed);
                warn!(
                    session_id = %session_id,
                    event_type = %event_type,
                    "Event posted after terminal event, discarded"
                );
            }
        }
        Ok(outcome)
    }

    /// Open a live subscription on a session, creating the session if needed
    pub fn subscribe(self: &Arc<Self>, session_id: &str) -> Result<Subscription, RelayError> {
        self.subscribe_with_idle_timeout(session_id, self.idle_timeout)
    }

    pub fn subscribe_with_idle_timeout(
        self: &Arc<Self>,
        session_id: &str,
        idle_timeout: Duration,
    ) -> Result<Subscription, RelayError> {
        validate_session_id(session_id)?;

        let queue = {
            let entry = self
                .sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(SessionQueue::new(session_id, self.max_queue_depth)));
            entry.attach_subscriber();
            Arc::clone(entry.value())
        };

        self.stats
            .subscriptions_opened
            .fetch_add(1, Ordering::Relaxed);
        log_relay_operation("subscribe", session_id, "opened", None);

        Ok(Subscription::new(Arc::clone(self), queue, idle_timeout))
    }

    /// Called when a subscription ends. The session goes away with its last subscriber.
    pub(crate) fn release(&self, queue: &Arc<SessionQueue>) {
        if queue.detach_subscriber() > 0 {
            return;
        }
        let removed = self
            .sessions
            .remove_if(queue.session_id(), |_, current| {
                Arc::ptr_eq(current, queue) && current.subscriber_count() == 0
            })
            .is_some();
        if removed {
            log_relay_operation("release", queue.session_id(), "removed", None);
        }
    }

    /// Drop sessions with no subscribers that have been idle for the session TTL
    pub fn reap_idle(&self) -> usize {
        let now = Instant::now();
        let ttl = self.session_ttl;
        let before = self.sessions.len();
        self.sessions.retain(|_, queue| !queue.is_reapable(now, ttl));
        let reaped = before.saturating_sub(self.sessions.len());
        if reaped > 0 {
            self.stats
                .sessions_reaped
                .fetch_add(reaped as u64, Ordering::Relaxed);
            debug!(reaped, remaining = self.sessions.len(), "Reaped idle sessions");
        }
        reaped
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn session(&self, session_id: &str) -> Option<Arc<SessionQueue>> {
        self.sessions.get(session_id).map(|queue| Arc::clone(queue.value()))
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StreamEventType;
    use serde_json::json;

    fn registry(max_queue_depth: usize) -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(&RelayConfig {
            max_queue_depth,
            idle_timeout_seconds: 300,
            session_ttl_seconds: 60,
            ..RelayConfig::default()
        }))
    }

    #[tokio::test]
    async fn test_events_posted_before_subscribe_are_delivered_in_order() {
        let registry = registry(100);
        for i in 0..5 {
            registry
                .post_event("s1", StreamEvent::progress(format!("step {i}")))
                .unwrap();
        }
        registry
            .post_event("s1", StreamEvent::terminal_success(json!({"ok": true})))
            .unwrap();

        let mut subscription = registry.subscribe("s1").unwrap();
        let mut received = Vec::new();
        while let Some(item) = subscription.next_event().await {
            received.push(item.unwrap());
        }

        assert_eq!(received.len(), 6);
        for (i, event) in received.iter().take(5).enumerate() {
            assert_eq!(event.data["message"], format!("step {i}"));
        }
        assert_eq!(received[5].event_type, StreamEventType::TerminalSuccess);
    }

    #[tokio::test]
    async fn test_subscriber_before_producer_misses_nothing() {
        let registry = registry(100);
        let mut subscription = registry.subscribe("early").unwrap();

        let producer = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for i in 0..3 {
                    registry
                        .post_event("early", StreamEvent::progress(format!("p{i}")))
                        .unwrap();
                    tokio::task::yield_now().await;
                }
                registry
                    .post_event("early", StreamEvent::terminal_error("boom", "EngineFailure"))
                    .unwrap();
            })
        };

        let mut types = Vec::new();
        while let Some(item) = subscription.next_event().await {
            types.push(item.unwrap().event_type);
        }
        producer.await.unwrap();

        assert_eq!(
            types,
            vec![
                StreamEventType::Progress,
                StreamEventType::Progress,
                StreamEventType::Progress,
                StreamEventType::TerminalError,
            ]
        );
    }

    #[tokio::test]
    async fn test_no_delivery_after_terminal() {
        let registry = registry(100);
        registry.post_event("s1", StreamEvent::progress("a")).unwrap();
        registry
            .post_event("s1", StreamEvent::terminal_success(json!({})))
            .unwrap();
        let outcome = registry
            .post_event("s1", StreamEvent::progress("late"))
            .unwrap();
        assert_eq!(outcome, PostOutcome::DiscardedAfterTerminal);

        let mut subscription = registry.subscribe("s1").unwrap();
        assert!(subscription.next_event().await.unwrap().is_ok());
        assert!(subscription.next_event().await.unwrap().unwrap().is_terminal());
        assert!(subscription.next_event().await.is_none());
        assert_eq!(registry.stats().snapshot().events_discarded, 1);
    }

    #[tokio::test]
    async fn test_buffering_without_subscriber_never_errors() {
        let registry = registry(10);
        for i in 0..25 {
            let outcome = registry
                .post_event("lonely", StreamEvent::progress(format!("e{i}")))
                .unwrap();
            assert!(matches!(outcome, PostOutcome::Buffered { .. }));
        }
        let queue = registry.session("lonely").unwrap();
        assert_eq!(queue.depth(), 10);

        let stats = registry.stats().snapshot();
        assert_eq!(stats.events_posted, 25);
        assert_eq!(stats.events_evicted, 15);

        let mut subscription = registry.subscribe("lonely").unwrap();
        let first = subscription.next_event().await.unwrap().unwrap();
        assert_eq!(first.data["message"], "e15");
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let registry = registry(100);
        registry.post_event("a", StreamEvent::progress("for a")).unwrap();
        registry.post_event("b", StreamEvent::progress("for b")).unwrap();
        registry
            .post_event("a", StreamEvent::terminal_success(json!({})))
            .unwrap();

        let mut sub_a = registry.subscribe("a").unwrap();
        let first = sub_a.next_event().await.unwrap().unwrap();
        assert_eq!(first.data["message"], "for a");
        assert_eq!(registry.session("b").unwrap().depth(), 1);
    }

    #[tokio::test]
    async fn test_last_subscriber_leaving_removes_session() {
        let registry = registry(100);
        let first = registry.subscribe("s1").unwrap();
        let second = registry.subscribe("s1").unwrap();
        assert_eq!(registry.session("s1").unwrap().subscriber_count(), 2);

        drop(first);
        assert_eq!(registry.session_count(), 1);
        drop(second);
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_see_full_sequence() {
        let registry = registry(100);
        let mut first = registry.subscribe("fan").unwrap();
        let mut second = registry.subscribe("fan").unwrap();

        registry.post_event("fan", StreamEvent::progress("one")).unwrap();
        registry
            .post_event("fan", StreamEvent::terminal_success(json!({})))
            .unwrap();

        for subscription in [&mut first, &mut second] {
            let a = subscription.next_event().await.unwrap().unwrap();
            let b = subscription.next_event().await.unwrap().unwrap();
            assert_eq!(a.data["message"], "one");
            assert!(b.is_terminal());
            assert!(subscription.next_event().await.is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reaper_removes_abandoned_sessions() {
        let registry = registry(100);
        registry.post_event("abandoned", StreamEvent::progress("x")).unwrap();
        let _held = registry.subscribe("watched").unwrap();

        assert_eq!(registry.reap_idle(), 0);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(registry.reap_idle(), 1);

        assert!(registry.session("abandoned").is_none());
        assert!(registry.session("watched").is_some());
        assert_eq!(registry.stats().snapshot().sessions_reaped, 1);
    }

    #[test]
    fn test_invalid_session_id_rejected() {
        let registry = registry(10);
        let err = registry
            .post_event("bad id/..", StreamEvent::progress("x"))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_session_id");
    }
}
