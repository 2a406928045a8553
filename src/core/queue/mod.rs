//! Bounded single-flight request queue.
//!
//! Many producers enqueue; one pump task drains the queue and keeps at most
//! one request on the wire. The next request is sent only after the previous
//! one's `response.done` resolves the in-flight signal.

mod pump;
mod request;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

pub use pump::{InFlight, PumpObserver, PumpTask, RequestPump};
pub use request::{DEFAULT_VOICE_INSTRUCTION, PendingRequest, VOICE_QUESTION_KIND};

/// What to do when a request arrives at a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued request to make room.
    #[default]
    DropOldest,
    /// Discard the incoming request.
    RejectNew,
}

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of waiting requests.
    /// Default: 25
    pub capacity: usize,

    /// Overflow behavior.
    /// Default: drop_oldest
    pub overflow: OverflowPolicy,

    /// Abandon a request whose response has not completed after this long
    /// (milliseconds). Unset waits indefinitely, so an upstream error that is
    /// never followed by `response.done` stalls the queue until a hard reset.
    pub response_timeout_ms: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 25,
            overflow: OverflowPolicy::DropOldest,
            response_timeout_ms: None,
        }
    }
}

impl QueueConfig {
    pub fn response_timeout(&self) -> Option<Duration> {
        self.response_timeout_ms.map(Duration::from_millis)
    }
}

/// Result of an enqueue attempt.
#[derive(Debug)]
pub enum EnqueueOutcome {
    /// Appended without displacing anything.
    Queued,
    /// Appended after discarding the returned oldest request.
    DroppedOldest(PendingRequest),
    /// Queue full, the returned incoming request was discarded.
    Rejected(PendingRequest),
}

/// Bounded FIFO of pending requests.
pub struct RequestQueue {
    entries: Mutex<VecDeque<PendingRequest>>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
    dropped: AtomicU64,
}

impl RequestQueue {
    pub fn new(config: &QueueConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy: config.overflow,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Requests discarded by the overflow policy since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Append a request, applying the overflow policy when full.
    pub fn enqueue(&self, request: PendingRequest) -> EnqueueOutcome {
        let outcome = {
            let mut entries = self.entries.lock();
            if entries.len() < self.capacity {
                entries.push_back(request);
                EnqueueOutcome::Queued
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        let oldest = entries.pop_front();
                        entries.push_back(request);
                        match oldest {
                            Some(oldest) => EnqueueOutcome::DroppedOldest(oldest),
                            None => EnqueueOutcome::Queued,
                        }
                    }
                    OverflowPolicy::RejectNew => EnqueueOutcome::Rejected(request),
                }
            }
        };

        match &outcome {
            EnqueueOutcome::Queued => {}
            EnqueueOutcome::DroppedOldest(dropped) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    request_id = %dropped.id,
                    kind = %dropped.kind,
                    "Queue full, dropped oldest request"
                );
            }
            EnqueueOutcome::Rejected(rejected) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    request_id = %rejected.id,
                    kind = %rejected.kind,
                    "Queue full, rejected new request"
                );
            }
        }

        if !matches!(outcome, EnqueueOutcome::Rejected(_)) {
            self.notify.notify_one();
        }
        outcome
    }

    /// Remove the head of the queue.
    pub fn pop(&self) -> Option<PendingRequest> {
        self.entries.lock().pop_front()
    }

    /// Wait until a request is available and remove it.
    pub async fn next(&self) -> PendingRequest {
        loop {
            if let Some(request) = self.pop() {
                return request;
            }
            // notify_one stores a permit when nobody waits, so no wakeup is lost.
            self.notify.notified().await;
        }
    }

    /// Drop every waiting request, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Kinds of the waiting requests, head first.
    pub fn kinds(&self) -> Vec<String> {
        self.entries.lock().iter().map(|r| r.kind.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize, overflow: OverflowPolicy) -> RequestQueue {
        RequestQueue::new(&QueueConfig {
            capacity,
            overflow,
            response_timeout_ms: None,
        })
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let queue = queue(3, OverflowPolicy::DropOldest);
        for kind in ["A", "B", "C"] {
            assert!(matches!(
                queue.enqueue(PendingRequest::new(kind)),
                EnqueueOutcome::Queued
            ));
        }

        match queue.enqueue(PendingRequest::new("D")) {
            EnqueueOutcome::DroppedOldest(dropped) => assert_eq!(dropped.kind, "A"),
            other => panic!("Unexpected outcome: {other:?}"),
        }
        assert_eq!(queue.kinds(), vec!["B", "C", "D"]);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_reject_new_when_full() {
        let queue = queue(3, OverflowPolicy::RejectNew);
        for kind in ["A", "B", "C"] {
            queue.enqueue(PendingRequest::new(kind));
        }

        match queue.enqueue(PendingRequest::new("D")) {
            EnqueueOutcome::Rejected(rejected) => assert_eq!(rejected.kind, "D"),
            other => panic!("Unexpected outcome: {other:?}"),
        }
        assert_eq!(queue.kinds(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_fifo_order_and_clear() {
        let queue = queue(10, OverflowPolicy::DropOldest);
        queue.enqueue(PendingRequest::new("A"));
        queue.enqueue(PendingRequest::new("B"));

        assert_eq!(queue.pop().map(|r| r.kind), Some("A".to_string()));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.clear(), 1);
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let queue = queue(0, OverflowPolicy::DropOldest);
        assert_eq!(queue.capacity(), 1);
    }

    #[tokio::test]
    async fn test_next_waits_for_enqueue() {
        let queue = std::sync::Arc::new(queue(4, OverflowPolicy::DropOldest));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next().await })
        };

        tokio::task::yield_now().await;
        queue.enqueue(PendingRequest::new("Late"));

        let request = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("next() should wake up")
            .unwrap();
        assert_eq!(request.kind, "Late");
    }
}
