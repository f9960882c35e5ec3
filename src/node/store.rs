//! Storage Node
//!
//! In-memory key-value map with per-entry TTL.
//!
//! # Design
//!
//! - One `RwLock` guards the entry map: reads share it, writes take it
//! - Each `set` stamps the entry with a fresh generation and arms a deadline
//! - Explicit deletes and expiry share one removal path; expiry only removes
//!   the entry when the generation still matches, so a refreshed key is never
//!   deleted by the deadline of the value it replaced
//! - Overwrites leave stale deadline records behind; once they outnumber live
//!   entries the queue is compacted, keeping it proportional to the map

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::expiry::{deadline_after, Deadline, ExpiryQueue};
use crate::duration::format_duration;
use crate::metrics::{NODE_ENTRIES, NODE_EXPIRED};
use crate::task::TaskHandle;

/// Stale records tolerated on top of twice the live entry count
const COMPACTION_SLACK: usize = 64;

/// A stored value and its expiry stamp
#[derive(Debug, Clone)]
pub struct Entry {
    value: Bytes,
    generation: u64,
    expires_at: Instant,
}

impl Entry {
    /// Stored bytes
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Generation assigned when the entry was written
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Check whether the deadline has passed at `now`
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Entry map owned by exactly one [`StorageNode`]
#[derive(Debug, Default)]
pub struct EntryMap {
    inner: RwLock<HashMap<String, Entry>>,
}

impl EntryMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones not yet swept included
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

/// In-memory TTL store behind one shard
#[derive(Debug)]
pub struct StorageNode {
    entries: EntryMap,
    expiry: ExpiryQueue,
    default_ttl: Duration,
    generation: AtomicU64,
}

impl StorageNode {
    /// Create a node over an injected map
    pub fn new(entries: EntryMap, default_ttl: Duration) -> Self {
        Self {
            entries,
            expiry: ExpiryQueue::new(),
            default_ttl,
            generation: AtomicU64::new(0),
        }
    }

    /// Create a node with an empty map
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self::new(EntryMap::new(), default_ttl)
    }

    /// TTL used when `set` is called with zero
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fetch the value for `key`, `None` when absent or past its deadline
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let map = self.entries.inner.read();
        map.get(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value().clone())
    }

    /// Store `value` under `key`, replacing any previous value and its TTL.
    ///
    /// A zero `ttl` means the node's default TTL.
    pub fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let expires_at = deadline_after(ttl);

        let (generation, len) = {
            let mut map = self.entries.inner.write();
            let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
            map.insert(
                key.to_string(),
                Entry {
                    value,
                    generation,
                    expires_at,
                },
            );
            (generation, map.len())
        };

        self.expiry.arm(Deadline {
            at: expires_at,
            key: key.to_string(),
            generation,
        });
        NODE_ENTRIES.set(len as i64);

        debug!("set key {:?} with ttl {}", key, format_duration(ttl));
        self.compact_if_needed(len);
    }

    /// Remove `key`. Returns whether an entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.remove(key, None);
        if removed {
            debug!("delete key {:?}", key);
        }
        removed
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the node holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Armed expirations, stale ones included
    pub fn pending_expirations(&self) -> usize {
        self.expiry.len()
    }

    /// Remove every entry whose deadline passed at `now`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut expired = 0;
        for deadline in self.expiry.pop_due(now) {
            if self.remove(&deadline.key, Some(deadline.generation)) {
                debug!("key {:?} expired", deadline.key);
                NODE_EXPIRED.inc();
                expired += 1;
            }
        }
        expired
    }

    /// Start the expiry sweeper.
    ///
    /// The sweeper sleeps until the earliest deadline, wakes early whenever a
    /// new deadline is armed, and stops when the handle or `parent` is
    /// cancelled.
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) -> TaskHandle {
        let node = Arc::clone(self);
        TaskHandle::spawn("expiry-sweeper", parent, move |cancel| async move {
            node.run_sweeper(cancel).await;
        })
    }

    async fn run_sweeper(&self, cancel: CancellationToken) {
        info!("Starting expiry sweeper");

        loop {
            self.sweep(Instant::now());

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Expiry sweeper shutting down");
                    break;
                }
                _ = self.expiry.wait() => {}
            }
        }
    }

    /// Drop deadline records that no longer match a live entry once they
    /// dominate the queue. Each compaction is paid for by at least `live + 64`
    /// earlier writes.
    fn compact_if_needed(&self, live: usize) {
        if self.expiry.len() <= 2 * live + COMPACTION_SLACK {
            return;
        }

        let map = self.entries.inner.read();
        let dropped = self.expiry.retain(|deadline| {
            map.get(&deadline.key)
                .is_some_and(|entry| entry.generation() == deadline.generation)
        });
        debug!(
            "compacted expiry queue: dropped {} stale records, {} pending",
            dropped,
            self.expiry.len()
        );
    }

    /// Shared removal path of `delete` and expiry.
    ///
    /// With `generation` set, only an entry of that generation is removed.
    fn remove(&self, key: &str, generation: Option<u64>) -> bool {
        let mut map = self.entries.inner.write();
        let matches = map
            .get(key)
            .is_some_and(|entry| generation.map_or(true, |g| g == entry.generation()));
        if !matches {
            return false;
        }
        map.remove(key);
        NODE_ENTRIES.set(map.len() as i64);
        true
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> StorageNode {
        StorageNode::with_default_ttl(Duration::from_secs(10))
    }

    #[test]
    fn test_storing() {
        let node = node();
        node.set("key1", Bytes::from_static(b"data"), Duration::ZERO);
        assert_eq!(node.get("key1"), Some(Bytes::from_static(b"data")));
        assert_eq!(node.len(), 1);
    }

    #[test]
    fn test_missing_key() {
        let node = node();
        assert!(node.get("never-set").is_none());
        assert!(!node.delete("never-set"));
    }

    #[test]
    fn test_key_overwrite() {
        let node = node();
        node.set("key1", Bytes::from_static(b"data1"), Duration::ZERO);
        node.set("key1", Bytes::from_static(b"data2"), Duration::ZERO);

        assert_eq!(node.get("key1"), Some(Bytes::from_static(b"data2")));
        assert_eq!(node.len(), 1);
        assert_eq!(node.pending_expirations(), 2);
    }

    #[test]
    fn test_hot_key_overwrites_keep_queue_bounded() {
        let node = StorageNode::with_default_ttl(Duration::from_secs(600));
        for i in 0..100_000u32 {
            node.set("hot", Bytes::from(i.to_string()), Duration::ZERO);
        }

        assert_eq!(node.len(), 1);
        assert!(node.pending_expirations() <= 2 + COMPACTION_SLACK + 1);
        assert_eq!(node.get("hot"), Some(Bytes::from_static(b"99999")));
    }

    #[test]
    fn test_compaction_keeps_live_deadlines() {
        let node = node();
        for i in 0..10 {
            node.set(&format!("live-{}", i), Bytes::from_static(b"v"), Duration::from_millis(50));
        }
        for _ in 0..500 {
            node.set("hot", Bytes::from_static(b"v"), Duration::from_secs(60));
        }

        assert!(node.pending_expirations() <= 2 * node.len() + COMPACTION_SLACK + 1);
        // Every short-lived entry still expires through its own record
        assert_eq!(node.sweep(Instant::now() + Duration::from_millis(60)), 10);
        assert_eq!(node.len(), 1);
    }

    #[test]
    fn test_delete() {
        let node = node();
        node.set("key1", Bytes::from_static(b"data1"), Duration::ZERO);

        assert!(node.delete("key1"));
        assert!(node.get("key1").is_none());
        assert!(!node.delete("key1"));
    }

    #[test]
    fn test_zero_ttl_uses_default() {
        let node = StorageNode::with_default_ttl(Duration::from_millis(20));
        node.set("k", Bytes::from_static(b"v"), Duration::ZERO);

        assert!(node.get("k").is_some());
        assert_eq!(node.sweep(Instant::now() + Duration::from_millis(25)), 1);
        assert!(node.get("k").is_none());
    }

    #[test]
    fn test_sweep_skips_refreshed_entry() {
        let node = node();
        node.set("k", Bytes::from_static(b"v1"), Duration::from_millis(50));
        node.set("k", Bytes::from_static(b"v2"), Duration::from_secs(10));

        // The 50ms record is due but belongs to the replaced generation
        assert_eq!(node.sweep(Instant::now() + Duration::from_millis(60)), 0);
        assert_eq!(node.get("k"), Some(Bytes::from_static(b"v2")));
    }

    #[test]
    fn test_sweep_after_delete_and_reset() {
        let node = node();
        node.set("k", Bytes::from_static(b"v1"), Duration::from_millis(10));
        node.delete("k");
        node.set("k", Bytes::from_static(b"v2"), Duration::from_secs(10));

        assert_eq!(node.sweep(Instant::now() + Duration::from_millis(20)), 0);
        assert_eq!(node.get("k"), Some(Bytes::from_static(b"v2")));
    }

    #[test]
    fn test_get_hides_entry_past_deadline() {
        let node = node();
        node.set("k", Bytes::from_static(b"v"), Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(10));

        // Not swept yet, but no longer readable
        assert_eq!(node.len(), 1);
        assert!(node.get("k").is_none());
    }

    #[tokio::test]
    async fn test_expiration_one_entry() {
        let node = Arc::new(StorageNode::with_default_ttl(Duration::ZERO));
        let root = CancellationToken::new();
        let sweeper = node.start(&root);

        node.set("key1", Bytes::from_static(b"data"), Duration::from_millis(50));
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert!(node.get("key1").is_none());
        assert!(node.is_empty());
        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_expiration_multiple_entries() {
        let node = Arc::new(StorageNode::with_default_ttl(Duration::ZERO));
        let root = CancellationToken::new();

        node.set("key1", Bytes::from_static(b"data"), Duration::from_millis(50));
        node.set("key2", Bytes::from_static(b"data"), Duration::from_secs(1));
        node.set("key3", Bytes::from_static(b"data"), Duration::from_secs(10));
        node.set("key4", Bytes::from_static(b"data"), Duration::from_nanos(1));

        let sweeper = node.start(&root);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(node.get("key1").is_none());
        assert!(node.get("key2").is_some());
        assert!(node.get("key3").is_some());
        assert!(node.get("key4").is_none());
        assert_eq!(node.len(), 2);

        root.cancel();
        sweeper.stop().await;
    }

    #[test]
    fn test_concurrent_distinct_keys() {
        let node = Arc::new(node());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let node = Arc::clone(&node);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let key = format!("k-{}-{}", t, i);
                        let value = Bytes::from(format!("v-{}-{}", t, i));
                        node.set(&key, value.clone(), Duration::ZERO);
                        assert_eq!(node.get(&key), Some(value));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(node.len(), 4000);
        assert_eq!(
            node.get("k-3-42"),
            Some(Bytes::from_static(b"v-3-42"))
        );
    }
}
