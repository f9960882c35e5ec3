//! Infrastructure Adapters
//!
//! Implementations of the shard ports defined in [`crate::domain::ports`].
//!
//! # Usage
//!
//! ```ignore
//! use stickycache::adapters::{build_client, RemoteStorage};
//! use stickycache::domain::ports::Liveness;
//!
//! let client = build_client(Duration::from_secs(2))?;
//! let shard = RemoteStorage::new("http://127.0.0.1:8181", client, Liveness::new(), probe_timeout);
//! ```

mod in_process;
mod remote;

pub use in_process::InProcessStorage;
pub use remote::{build_client, RemoteStorage, DEFAULT_PROBE_TIMEOUT};
