//! Expiry Queue
//!
//! Deadline-ordered min-heap of armed expirations with a single waiter.
//!
//! # Design
//!
//! - Every `set` pushes a `(deadline, key, generation)` record
//! - An overwritten or deleted entry no longer matches the generation carried
//!   by its old record; such stale records are skipped when they come due, or
//!   dropped earlier by [`ExpiryQueue::retain`] when the owner compacts
//! - The sweeper sleeps until the earliest deadline and is woken through
//!   [`Notify`] whenever a record is pushed

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

/// One armed expiration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deadline {
    /// When the entry expires
    pub at: Instant,
    /// Entry key
    pub key: String,
    /// Generation of the entry this record was armed for
    pub generation: u64,
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first)
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.generation.cmp(&self.generation))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Heap of pending expirations shared by a node and its sweeper
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    heap: Mutex<BinaryHeap<Deadline>>,
    wakeup: Notify,
}

impl ExpiryQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm an expiration and wake the sweeper
    pub fn arm(&self, deadline: Deadline) {
        self.heap.lock().push(deadline);
        // Stores a permit when the sweeper is busy, so the wakeup is not lost
        self.wakeup.notify_one();
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.lock().peek().map(|d| d.at)
    }

    /// Pop every record whose deadline is at or before `now`
    pub fn pop_due(&self, now: Instant) -> Vec<Deadline> {
        let mut heap = self.heap.lock();
        let mut due = Vec::new();
        while heap.peek().is_some_and(|d| d.at <= now) {
            if let Some(d) = heap.pop() {
                due.push(d);
            }
        }
        due
    }

    /// Wait until a new record is armed
    pub async fn changed(&self) {
        self.wakeup.notified().await;
    }

    /// Wait until the earliest deadline passes or a new record is armed.
    ///
    /// With an empty queue this only returns on a new record.
    pub async fn wait(&self) {
        match self.next_deadline() {
            Some(at) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => {}
                    _ = self.changed() => {}
                }
            }
            None => self.changed().await,
        }
    }

    /// Number of pending records, stale ones included
    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    /// Keep only the records `keep` accepts, returning how many were dropped
    pub fn retain(&self, mut keep: impl FnMut(&Deadline) -> bool) -> usize {
        let mut heap = self.heap.lock();
        let before = heap.len();
        heap.retain(|d| keep(d));
        before - heap.len()
    }
}

/// Deadline for a TTL starting now
pub fn deadline_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 86_400))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(at: Instant, key: &str, generation: u64) -> Deadline {
        Deadline {
            at,
            key: key.to_string(),
            generation,
        }
    }

    #[test]
    fn test_deadline_ordering() {
        let now = Instant::now();
        let early = record(now + Duration::from_secs(5), "a", 1);
        let late = record(now + Duration::from_secs(10), "b", 2);

        // Earlier deadline is "greater" for the min-heap
        assert!(early > late);
    }

    #[test]
    fn test_pop_due_returns_only_expired() {
        let queue = ExpiryQueue::new();
        let now = Instant::now();

        queue.arm(record(now + Duration::from_secs(10), "later", 1));
        queue.arm(record(now - Duration::from_millis(1), "past", 2));
        queue.arm(record(now, "now", 3));

        let due = queue.pop_due(now);
        let keys: Vec<_> = due.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["past", "now"]);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_deadline(), Some(now + Duration::from_secs(10)));
    }

    #[test]
    fn test_empty_queue() {
        let queue = ExpiryQueue::new();
        assert_eq!(queue.len(), 0);
        assert!(queue.next_deadline().is_none());
        assert!(queue.pop_due(Instant::now()).is_empty());
    }

    #[test]
    fn test_retain_drops_rejected_records() {
        let queue = ExpiryQueue::new();
        let now = Instant::now();
        for generation in 1..=5 {
            queue.arm(record(now + Duration::from_secs(generation), "k", generation));
        }

        assert_eq!(queue.retain(|d| d.generation == 5), 4);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_deadline(), Some(now + Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_wait_wakes_on_arm() {
        let queue = std::sync::Arc::new(ExpiryQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.wait().await })
        };

        queue.arm(record(Instant::now() + Duration::from_secs(60), "k", 1));

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake when a deadline is armed")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_sleeps_until_deadline() {
        let queue = ExpiryQueue::new();
        let at = Instant::now() + Duration::from_millis(50);
        queue.arm(record(at, "k", 1));
        // Consume the permit stored by arm
        queue.changed().await;

        queue.wait().await;
        assert!(Instant::now() >= at);
    }
}
