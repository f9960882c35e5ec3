//! Storage Node
//!
//! The data-holding leaf of the cache: an in-memory map with per-entry TTL
//! and a single background sweeper that removes entries once their deadline
//! passes.
//!
//! ```text
//!   set ──▶ EntryMap (RwLock) ──▶ ExpiryQueue (min-heap) ◀── sweeper
//!   get ──▶ EntryMap (read)                                   │
//!   delete ─▶ remove(key) ◀──────── remove(key, generation) ◀─┘
//! ```

mod expiry;
mod store;

pub use expiry::{Deadline, ExpiryQueue};
pub use store::{Entry, EntryMap, StorageNode};
