//! Prometheus metrics
//!
//! Process-wide collectors registered once on the default registry and
//! exposed on `/metrics` by both servers.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, register_int_gauge_vec,
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

/// Router operations by operation and outcome
pub static ROUTER_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "stickycache_router_operations_total",
        "Router operations by operation and outcome",
        &["op", "outcome"]
    )
    .expect("router operations counter registers once")
});

/// Writes placed on a different shard than the one in the index
pub static ROUTER_FAILOVERS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "stickycache_router_failovers_total",
        "Writes that moved a key to a different shard"
    )
    .expect("failover counter registers once")
});

/// Last probe result per shard (1 alive, 0 dead)
pub static SHARD_ALIVE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "stickycache_shard_alive",
        "Last probe result per shard",
        &["shard"]
    )
    .expect("shard liveness gauge registers once")
});

/// Entries currently held by the storage node
pub static NODE_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("stickycache_node_entries", "Entries held by the storage node")
        .expect("node entries gauge registers once")
});

/// Entries removed by TTL expiry
pub static NODE_EXPIRED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "stickycache_node_expired_total",
        "Entries removed by TTL expiry"
    )
    .expect("node expiry counter registers once")
});

/// Record the outcome of one router operation
pub fn record_operation(op: &str, outcome: &str) {
    ROUTER_OPERATIONS.with_label_values(&[op, outcome]).inc();
}

/// Encode every registered metric in the text exposition format.
///
/// Returns the body and its content type.
pub fn encode() -> (Vec<u8>, String) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        buffer.clear();
    }
    (buffer, encoder.format_type().to_string())
}
