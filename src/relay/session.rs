//! Per-session bounded event buffer.
//!
//! Events are kept as a sliding window over a monotonically increasing
//! sequence. Subscribers read with their own cursor, so every subscriber sees
//! the full ordered sequence that is still retained.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::events::StreamEvent;

/// What happened to a posted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    /// Appended to the buffer; `evicted_oldest` when the buffer was full
    Buffered { evicted_oldest: bool },
    /// The session already saw a terminal event; the event was dropped
    DiscardedAfterTerminal,
}

/// Result of reading at a cursor
#[derive(Debug)]
pub(crate) enum ReadResult {
    Event {
        event: StreamEvent,
        next_cursor: u64,
        /// Events evicted before this reader got to them
        skipped: u64,
    },
    Pending,
    Ended,
}

#[derive(Debug)]
struct SessionState {
    buffer: VecDeque<StreamEvent>,
    /// Sequence number of `buffer[0]`
    base_seq: u64,
    terminated: bool,
    subscribers: usize,
    last_activity: Instant,
}

#[derive(Debug)]
pub struct SessionQueue {
    session_id: String,
    max_depth: usize,
    state: Mutex<SessionState>,
    notify: Notify,
}

impl SessionQueue {
    pub fn new(session_id: impl Into<String>, max_depth: usize) -> Self {
        Self {
            session_id: session_id.into(),
            max_depth: max_depth.max(1),
            state: Mutex::new(SessionState {
                buffer: VecDeque::new(),
                base_seq: 0,
                terminated: false,
                subscribers: 0,
                last_activity: Instant::now(),
            }),
            notify: Notify::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append an event, evicting the oldest one when the buffer is full
    pub fn push(&self, event: StreamEvent) -> PostOutcome {
        let mut state = self.state.lock();
        if state.terminated {
            return PostOutcome::DiscardedAfterTerminal;
        }

        let mut evicted_oldest = false;
        if state.buffer.len() >= self.max_depth {
            state.buffer.pop_front();
            state.base_seq += 1;
            evicted_oldest = true;
        }

        state.terminated = event.is_terminal();
        state.buffer.push_back(event);
        state.last_activity = Instant::now();
        drop(state);

        self.notify.notify_waiters();
        PostOutcome::Buffered { evicted_oldest }
    }

    pub(crate) fn read_from(&self, cursor: u64) -> ReadResult {
        let state = self.state.lock();
        let (cursor, skipped) = if cursor < state.base_seq {
            (state.base_seq, state.base_seq - cursor)
        } else {
            (cursor, 0)
        };

        let index = (cursor - state.base_seq) as usize;
        match state.buffer.get(index) {
            Some(event) => ReadResult::Event {
                event: event.clone(),
                next_cursor: cursor + 1,
                skipped,
            },
            None if state.terminated => ReadResult::Ended,
            None => ReadResult::Pending,
        }
    }

    /// Sequence number of the oldest retained event; new readers start here
    pub(crate) fn first_cursor(&self) -> u64 {
        self.state.lock().base_seq
    }

    pub(crate) fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }

    pub(crate) fn attach_subscriber(&self) {
        let mut state = self.state.lock();
        state.subscribers += 1;
        state.last_activity = Instant::now();
    }

    /// Returns the number of subscribers left
    pub(crate) fn detach_subscriber(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers = state.subscribers.saturating_sub(1);
        state.last_activity = Instant::now();
        state.subscribers
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers
    }

    pub fn depth(&self) -> usize {
        self.state.lock().buffer.len()
    }

    pub fn is_terminated(&self) -> bool {
        self.state.lock().terminated
    }

    /// Unsubscribed and untouched for longer than `ttl`
    pub(crate) fn is_reapable(&self, now: Instant, ttl: Duration) -> bool {
        let state = self.state.lock();
        state.subscribers == 0 && now.saturating_duration_since(state.last_activity) >= ttl
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<StreamEvent> {
        self.state.lock().buffer.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_evicts_oldest_when_full() {
        let queue = SessionQueue::new("s1", 3);
        for i in 0..3 {
            assert_eq!(
                queue.push(StreamEvent::progress(format!("e{i}"))),
                PostOutcome::Buffered {
                    evicted_oldest: false
                }
            );
        }
        assert_eq!(
            queue.push(StreamEvent::progress("e3")),
            PostOutcome::Buffered {
                evicted_oldest: true
            }
        );

        let messages: Vec<_> = queue
            .snapshot()
            .into_iter()
            .map(|event| event.data["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(messages, vec!["e1", "e2", "e3"]);
        assert_eq!(queue.first_cursor(), 1);
    }

    #[test]
    fn test_posts_after_terminal_are_discarded() {
        let queue = SessionQueue::new("s1", 10);
        queue.push(StreamEvent::terminal_success(json!({"rows": 3})));
        assert_eq!(
            queue.push(StreamEvent::progress("late")),
            PostOutcome::DiscardedAfterTerminal
        );
        assert_eq!(queue.depth(), 1);
        assert!(queue.is_terminated());
    }

    #[test]
    fn test_lagging_cursor_skips_to_oldest_retained() {
        let queue = SessionQueue::new("s1", 2);
        for i in 0..5 {
            queue.push(StreamEvent::progress(format!("e{i}")));
        }
        match queue.read_from(0) {
            ReadResult::Event {
                event,
                next_cursor,
                skipped,
            } => {
                assert_eq!(event.data["message"], "e3");
                assert_eq!(next_cursor, 4);
                assert_eq!(skipped, 3);
            }
            other => panic!("expected event, got {other:?}"),
        }
        assert!(matches!(queue.read_from(5), ReadResult::Pending));
    }

    #[test]
    fn test_subscriber_accounting() {
        let queue = SessionQueue::new("s1", 2);
        queue.attach_subscriber();
        queue.attach_subscriber();
        assert_eq!(queue.subscriber_count(), 2);
        assert_eq!(queue.detach_subscriber(), 1);
        assert_eq!(queue.detach_subscriber(), 0);
        assert_eq!(queue.detach_subscriber(), 0);
    }
}
