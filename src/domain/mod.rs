//! Domain Layer
//!
//! Port traits the router is written against. Adapters in
//! [`crate::adapters`] implement them for real and in-process shards.

pub mod ports;

pub use ports::{Liveness, Probe, Storage};
