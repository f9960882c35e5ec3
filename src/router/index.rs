//! Shard Index
//!
//! Key → shard ordinal map owned by the router. Every access goes through a
//! single mutex; no shard call is ever made while it is held.

use std::collections::HashMap;

use parking_lot::Mutex;

/// Mapping from key to the ordinal of the shard that took its last write
#[derive(Debug, Default)]
pub struct ShardIndex {
    inner: Mutex<HashMap<String, usize>>,
}

impl ShardIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Ordinal recorded for `key`
    pub fn lookup(&self, key: &str) -> Option<usize> {
        self.inner.lock().get(key).copied()
    }

    /// Record `ordinal` for `key`, returning the ordinal it replaced
    pub fn record(&self, key: &str, ordinal: usize) -> Option<usize> {
        self.inner.lock().insert(key.to_string(), ordinal)
    }

    /// Drop `key` only while it still points at `ordinal`.
    ///
    /// Returns whether the entry was removed.
    pub fn remove_if(&self, key: &str, ordinal: usize) -> bool {
        let mut map = self.inner.lock();
        if map.get(key) == Some(&ordinal) {
            map.remove(key);
            true
        } else {
            false
        }
    }

    /// Number of indexed keys
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if no key is indexed
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Number of keys recorded per ordinal, for `shard_count` shards
    pub fn distribution(&self, shard_count: usize) -> Vec<usize> {
        let mut counts = vec![0; shard_count];
        for &ordinal in self.inner.lock().values() {
            if let Some(count) = counts.get_mut(ordinal) {
                *count += 1;
            }
        }
        counts
    }
}
