//! Heartbeat cadence for one activity attempt.
//!
//! A heartbeat goes out every N forwarded events or when the interval elapses
//! without one, whichever comes first.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::models::StreamDeliveryStats;
use crate::orchestration::{ActivityWorkerApi, TaskToken};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    pub every_n_events: u64,
    pub interval: Duration,
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for HeartbeatPolicy {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            every_n_events: config.heartbeat_every_events.max(1),
            interval: config.heartbeat_interval(),
        }
    }
}

/// Diagnostic string attached to each heartbeat
pub fn heartbeat_details(stats: &StreamDeliveryStats) -> String {
    format!(
        "events_sent={} events_failed={}",
        stats.events_sent, stats.events_failed
    )
}

/// What the platform said about the attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    Continue,
    CancelRequested,
    /// The attempt was rescheduled elsewhere; stop without reporting
    Stale,
}

#[derive(Debug)]
pub struct Heartbeater {
    platform: Arc<dyn ActivityWorkerApi>,
    token: TaskToken,
    policy: HeartbeatPolicy,
    ticker: Interval,
    events_since_beat: u64,
    beats_sent: u64,
}

impl Heartbeater {
    pub fn new(platform: Arc<dyn ActivityWorkerApi>, token: TaskToken, policy: HeartbeatPolicy) -> Self {
        let mut ticker = tokio::time::interval_at(Instant::now() + policy.interval, policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            platform,
            token,
            policy,
            ticker,
            events_since_beat: 0,
            beats_sent: 0,
        }
    }

    /// Count one forwarded event; true when the event cadence calls for a beat
    pub fn record_event(&mut self) -> bool {
        self.events_since_beat += 1;
        self.events_since_beat >= self.policy.every_n_events
    }

    /// Resolves when the interval elapses without an event-driven beat
    pub async fn interval_elapsed(&mut self) {
        self.ticker.tick().await;
    }

    pub async fn beat(&mut self, stats: &StreamDeliveryStats) -> HeartbeatOutcome {
        self.events_since_beat = 0;
        self.ticker.reset();
        let details = heartbeat_details(stats);

        match self.platform.record_heartbeat(&self.token, &details).await {
            Ok(response) => {
                self.beats_sent += 1;
                debug!(token = %self.token, details = %details, "Heartbeat recorded");
                if response.cancel_requested {
                    HeartbeatOutcome::CancelRequested
                } else {
                    HeartbeatOutcome::Continue
                }
            }
            Err(e) if e.is_stale() => {
                warn!(token = %self.token, error = %e, "Heartbeat rejected, attempt is stale");
                HeartbeatOutcome::Stale
            }
            Err(e) => {
                // Liveness is the platform's call; keep working and try again next beat
                warn!(token = %self.token, error = %e, "Heartbeat failed");
                HeartbeatOutcome::Continue
            }
        }
    }

    pub fn beats_sent(&self) -> u64 {
        self.beats_sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_format() {
        let stats = StreamDeliveryStats {
            events_sent: 7,
            events_failed: 2,
        };
        assert_eq!(heartbeat_details(&stats), "events_sent=7 events_failed=2");
    }

    #[test]
    fn test_policy_from_config() {
        let policy = HeartbeatPolicy::from(&WorkerConfig {
            heartbeat_every_events: 0,
            heartbeat_interval_seconds: 3,
            ..WorkerConfig::default()
        });
        assert_eq!(policy.every_n_events, 1);
        assert_eq!(policy.interval, Duration::from_secs(3));
    }
}
