//! Router
//!
//! Shards keys across a fixed list of storages with sticky placement and
//! health-aware failover.
//!
//! # Placement
//!
//! - A key's writes stay on the shard recorded in the index while that shard
//!   is alive and accepts them
//! - Otherwise alive shards are tried in [`Placement`] order; the first one
//!   that accepts the write is recorded
//! - Reads and deletes only ever go to the recorded shard
//!
//! Shard calls are made outside the index lock. Two concurrent writers to the
//! same key can race; the index keeps whichever write completed last.

mod index;
mod placement;

pub use index::ShardIndex;
pub use placement::{fnv1a, Placement};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::ports::Storage;
use crate::error::{Error, Result};
use crate::metrics::{record_operation, ROUTER_FAILOVERS};

/// Default TTL substituted for a zero TTL
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

/// Default bound on a single shard call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Router behaviour fixed at startup
#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// TTL used when a write carries none
    pub default_ttl: Duration,
    /// Bound on every data-path shard call
    pub call_timeout: Duration,
    /// Candidate order for writes the index cannot place
    pub placement: Placement,
    /// Drop the index entry once a delete succeeded on its shard
    pub prune_on_delete: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            placement: Placement::Linear,
            prune_on_delete: true,
        }
    }
}

/// Front door of the cache
pub struct Router {
    shards: Vec<Arc<dyn Storage>>,
    index: ShardIndex,
    settings: RouterSettings,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let addrs: Vec<&str> = self.shards.iter().map(|s| s.addr()).collect();
        f.debug_struct("Router")
            .field("shards", &addrs)
            .field("indexed_keys", &self.index.len())
            .field("settings", &self.settings)
            .finish()
    }
}

impl Router {
    /// Create a router over a fixed shard list and an injected index
    pub fn new(shards: Vec<Arc<dyn Storage>>, index: ShardIndex, settings: RouterSettings) -> Self {
        info!(
            "Router ready with {} shards, placement {}, default ttl {:?}",
            shards.len(),
            settings.placement,
            settings.default_ttl
        );
        Self {
            shards,
            index,
            settings,
        }
    }

    /// Shard list in ordinal order
    pub fn shards(&self) -> &[Arc<dyn Storage>] {
        &self.shards
    }

    /// Number of shards currently marked alive
    pub fn alive_shards(&self) -> usize {
        self.shards.iter().filter(|s| s.is_alive()).count()
    }

    /// Ordinal recorded for `key`
    pub fn shard_of(&self, key: &str) -> Option<usize> {
        self.index.lookup(key)
    }

    /// Read-only view of the index
    pub fn index(&self) -> &ShardIndex {
        &self.index
    }

    /// Store `value` under `key`.
    ///
    /// A zero `ttl` means the configured default. Fails with
    /// [`Error::Exhausted`] when no alive shard accepts the write.
    #[instrument(skip(self, value), fields(len = value.len()))]
    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let ttl = if ttl.is_zero() {
            self.settings.default_ttl
        } else {
            ttl
        };

        let sticky = self.index.lookup(key).and_then(|ordinal| self.shard(ordinal));
        if let Some(shard) = sticky {
            if shard.is_alive() {
                match self.call(shard.as_ref(), shard.set(key, value.clone(), ttl)).await {
                    Ok(()) => {
                        record_operation("set", "ok");
                        return Ok(());
                    }
                    Err(e) => {
                        warn!(
                            "store key {:?} in sticky storage {:?} failed: {}",
                            key,
                            shard.addr(),
                            e
                        );
                    }
                }
            } else {
                debug!("sticky storage {:?} for key {:?} is not alive", shard.addr(), key);
            }
        }

        let alive: Vec<bool> = self.shards.iter().map(|s| s.is_alive()).collect();
        for ordinal in self.settings.placement.candidates(key, &alive) {
            let shard = &self.shards[ordinal];
            // Liveness may have flipped since the snapshot
            if !shard.is_alive() {
                continue;
            }

            if let Err(e) = self.call(shard.as_ref(), shard.set(key, value.clone(), ttl)).await {
                error!(
                    "store key {:?} in storage with addr {:?} failed: {}",
                    key,
                    shard.addr(),
                    e
                );
                continue;
            }

            let previous = self.index.record(key, ordinal);
            if let Some(previous) = previous.filter(|&p| p != ordinal) {
                ROUTER_FAILOVERS.inc();
                info!(
                    "key {:?} moved from storage {:?} to {:?}",
                    key,
                    self.shard(previous).map_or("<unknown>", |s| s.addr()),
                    shard.addr()
                );
            }
            record_operation("set", "ok");
            return Ok(());
        }

        record_operation("set", "exhausted");
        Err(Error::Exhausted {
            key: key.to_string(),
        })
    }

    /// Fetch the value stored under `key` from its recorded shard
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> Result<Bytes> {
        let result = match self.recorded_shard(key) {
            Ok(shard) => self.call(shard.as_ref(), shard.get(key)).await,
            Err(e) => Err(e),
        };
        record_operation("get", outcome(&result));
        result
    }

    /// Remove `key` from its recorded shard
    #[instrument(skip(self))]
    pub async fn delete(&self, key: &str) -> Result<()> {
        let result = match self.index.lookup(key) {
            None => Err(Error::not_found(key)),
            Some(ordinal) => match self.shard(ordinal) {
                None => Err(self.unknown_ordinal(key, ordinal)),
                Some(shard) if !shard.is_alive() => Err(Error::unavailable(shard.addr())),
                Some(shard) => {
                    let result = self.call(shard.as_ref(), shard.delete(key)).await;
                    if result.is_ok() && self.settings.prune_on_delete {
                        self.index.remove_if(key, ordinal);
                    }
                    result
                }
            },
        };
        record_operation("delete", outcome(&result));
        result
    }

    /// Shard recorded for `key`, if it is alive
    fn recorded_shard(&self, key: &str) -> Result<&Arc<dyn Storage>> {
        let ordinal = self.index.lookup(key).ok_or_else(|| Error::not_found(key))?;
        let shard = self
            .shard(ordinal)
            .ok_or_else(|| self.unknown_ordinal(key, ordinal))?;
        if !shard.is_alive() {
            return Err(Error::unavailable(shard.addr()));
        }
        Ok(shard)
    }

    /// Shard at `ordinal`, `None` when the index names one this router lacks
    fn shard(&self, ordinal: usize) -> Option<&Arc<dyn Storage>> {
        self.shards.get(ordinal)
    }

    /// An injected index may carry ordinals past the shard list
    fn unknown_ordinal(&self, key: &str, ordinal: usize) -> Error {
        warn!(
            "key {:?} is indexed to storage #{} but only {} storages exist",
            key,
            ordinal,
            self.shards.len()
        );
        Error::unavailable(format!("#{}", ordinal))
    }

    /// Bound a shard call by the configured timeout
    async fn call<T>(&self, shard: &dyn Storage, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.settings.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                addr: shard.addr().to_string(),
            }),
        }
    }
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(Error::NotFound { .. }) => "not_found",
        Err(Error::Unavailable { .. }) => "unavailable",
        Err(Error::Timeout { .. }) => "timeout",
        Err(_) => "error",
    }
}
