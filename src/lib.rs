//! StickyCache - Distributed Ephemeral Key/Value Cache
//!
//! A router shards keys across a fixed set of storage nodes. Each node keeps
//! entries in memory with a per-entry TTL; the router remembers where every
//! key was written and keeps sending it there while that node is healthy.
//!
//! # Architecture
//!
//! ```text
//!   client ──▶ Router ──▶ ShardIndex (key → ordinal)
//!                │
//!                ├──▶ RemoteStorage #0 ◀── HealthMonitor #0
//!                ├──▶ RemoteStorage #1 ◀── HealthMonitor #1
//!                └──▶ ...
//!                         │ HTTP
//!                         ▼
//!                    StorageNode (map + expiry heap + sweeper)
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Remote and in-process shard adapters
//! - [`config`] - Router YAML configuration
//! - [`domain`] - Shard port traits
//! - [`duration`] - Duration strings such as `1m30s`
//! - [`error`] - Error types
//! - [`health`] - Per-shard liveness probing
//! - [`metrics`] - Prometheus metrics
//! - [`node`] - Storage node TTL engine
//! - [`router`] - Sticky placement and failover
//! - [`server`] - HTTP front ends for node and router
//! - [`task`] - Cancellable background tasks

pub mod adapters;
pub mod config;
pub mod domain;
pub mod duration;
pub mod error;
pub mod health;
pub mod metrics;
pub mod node;
pub mod router;
pub mod server;
pub mod task;

// Re-export commonly used types
pub use adapters::{InProcessStorage, RemoteStorage};
pub use config::{Config, RouterConfig, StorageConfig};
pub use domain::{Liveness, Probe, Storage};
pub use error::{Error, Result};
pub use health::HealthMonitor;
pub use node::StorageNode;
pub use router::{Placement, Router, RouterSettings, ShardIndex};
pub use task::TaskHandle;
