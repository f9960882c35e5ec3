//! Domain Ports (Port/Adapter Pattern)
//!
//! The router and the health monitor only ever talk to shards through the
//! traits defined here. Adapters in [`crate::adapters`] implement them for a
//! node reached over HTTP and for a node living in the same process.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                            │
//! │        Router ──▶ Storage          HealthMonitor ──▶ Probe     │
//! └───────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │                     Infrastructure Layer                       │
//! │            RemoteStorage  │  InProcessStorage                  │
//! └───────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

// =============================================================================
// Liveness
// =============================================================================

/// Cached liveness flag of one shard.
///
/// Cloning shares the flag. The health monitor is the only writer; the
/// router only reads it. A fresh flag reads as dead until the first probe.
#[derive(Debug, Clone, Default)]
pub struct Liveness(Arc<AtomicBool>);

impl Liveness {
    /// Create a flag that reads as dead
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the cached flag
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Store a probe outcome, returning the previous value
    pub fn set(&self, alive: bool) -> bool {
        self.0.swap(alive, Ordering::AcqRel)
    }
}

// =============================================================================
// Storage Port
// =============================================================================

/// One shard as seen by the router.
///
/// `get` reports an absent key as [`crate::Error::NotFound`]. `addr` and
/// `is_alive` never touch the network.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Store `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Remove `key`.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Shard identity.
    fn addr(&self) -> &str;

    /// Cached liveness flag.
    fn is_alive(&self) -> bool;
}

// =============================================================================
// Probe Port
// =============================================================================

/// Liveness probe of one shard. Returns success or failure with no payload.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Run a single probe.
    async fn probe(&self) -> bool;

    /// Address of the probed shard, for logs.
    fn addr(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_starts_dead() {
        let flag = Liveness::new();
        assert!(!flag.is_alive());
    }

    #[test]
    fn test_liveness_is_shared_between_clones() {
        let writer = Liveness::new();
        let reader = writer.clone();

        assert!(!writer.set(true));
        assert!(reader.is_alive());

        assert!(writer.set(false));
        assert!(!reader.is_alive());
    }
}
