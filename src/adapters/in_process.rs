//! In-Process Storage Adapter
//!
//! Implements the `Storage` and `Probe` ports over a [`StorageNode`] living in
//! the same process. Used to embed the cache and to exercise the router
//! without a network.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::ports::{Liveness, Probe, Storage};
use crate::error::{Error, Result};
use crate::node::StorageNode;

/// Shard adapter calling a local node directly
pub struct InProcessStorage {
    addr: String,
    node: Arc<StorageNode>,
    liveness: Liveness,
    reachable: AtomicBool,
}

impl InProcessStorage {
    /// Wrap `node` under the identity `addr`
    pub fn new(addr: impl Into<String>, node: Arc<StorageNode>, liveness: Liveness) -> Self {
        Self {
            addr: addr.into(),
            node,
            liveness,
            reachable: AtomicBool::new(true),
        }
    }

    /// Wrapped node
    pub fn node(&self) -> &Arc<StorageNode> {
        &self.node
    }

    /// Liveness flag read by this adapter
    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    /// Cut or restore the path to the node.
    ///
    /// While cut, data calls fail and probes report the node dead. The cached
    /// liveness flag is left alone until the next probe.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::unavailable(&self.addr))
        }
    }
}

impl std::fmt::Debug for InProcessStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessStorage")
            .field("addr", &self.addr)
            .field("alive", &self.liveness.is_alive())
            .field("entries", &self.node.len())
            .finish()
    }
}

#[async_trait]
impl Storage for InProcessStorage {
    async fn get(&self, key: &str) -> Result<Bytes> {
        self.ensure_reachable()?;
        self.node.get(key).ok_or_else(|| Error::not_found(key))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.ensure_reachable()?;
        self.node.set(key, value, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.ensure_reachable()?;
        self.node.delete(key);
        Ok(())
    }

    fn addr(&self) -> &str {
        &self.addr
    }

    fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }
}

#[async_trait]
impl Probe for InProcessStorage {
    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> InProcessStorage {
        InProcessStorage::new(
            "local-0",
            Arc::new(StorageNode::with_default_ttl(Duration::from_secs(10))),
            Liveness::new(),
        )
    }

    #[test]
    fn test_round_trip_through_port() {
        let storage = adapter();
        tokio_test::block_on(async {
            storage.set("k", Bytes::from_static(b"v"), Duration::ZERO).await.unwrap();
            assert_eq!(storage.get("k").await.unwrap(), Bytes::from_static(b"v"));

            storage.delete("k").await.unwrap();
            assert!(storage.get("k").await.unwrap_err().is_not_found());
        });
    }

    #[test]
    fn test_unreachable_node() {
        let storage = adapter();
        storage.set_reachable(false);
        tokio_test::block_on(async {
            assert!(!storage.probe().await);
            assert!(matches!(
                storage.get("k").await,
                Err(Error::Unavailable { .. })
            ));
        });
    }
}
