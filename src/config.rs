//! Configuration
//!
//! The router reads its shard list from a YAML file:
//!
//! ```yaml
//! router:
//!   addr: 127.0.0.1:8080
//!   defaultTtl: 10s
//!   storages:
//!     - addr: http://127.0.0.1:8181
//!       healthCheckInterval: 5s
//! ```
//!
//! Everything is read once at startup and treated as immutable afterwards.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapters::DEFAULT_PROBE_TIMEOUT;
use crate::duration::serde_duration;
use crate::error::{Error, Result};
use crate::health::DEFAULT_HEALTH_CHECK_INTERVAL;
use crate::router::{Placement, RouterSettings, DEFAULT_CALL_TIMEOUT, DEFAULT_TTL};
use crate::server::{
    ServerTimeouts, DEFAULT_ROUTER_HANDLER_TIMEOUT, DEFAULT_ROUTER_READ_HEADER_TIMEOUT,
};

/// Default router listen address
pub const DEFAULT_ROUTER_ADDR: &str = "127.0.0.1:8080";

/// Top-level config file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub router: RouterConfig,
}

/// Router process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Listen address
    #[serde(default = "default_router_addr")]
    pub addr: String,

    /// Shards in ordinal order
    #[serde(default)]
    pub storages: Vec<StorageConfig>,

    /// TTL substituted for writes without one
    #[serde(default = "default_ttl", with = "serde_duration")]
    pub default_ttl: Duration,

    /// Bound on every data-path shard call
    #[serde(default = "default_call_timeout", with = "serde_duration")]
    pub call_timeout: Duration,

    /// Candidate order for writes the index cannot place
    #[serde(default)]
    pub placement: Placement,

    /// Drop the index entry once a delete succeeded
    #[serde(default = "default_true")]
    pub prune_on_delete: bool,

    /// Bound on receiving a client's request headers
    #[serde(default = "default_read_header_timeout", with = "serde_duration")]
    pub read_header_timeout: Duration,

    /// Bound on answering one client request, failover scan included
    #[serde(default = "default_handler_timeout", with = "serde_duration")]
    pub handler_timeout: Duration,
}

/// One shard entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Base URL of the storage node
    pub addr: String,

    /// Pause between liveness probes
    #[serde(default = "default_health_check_interval", with = "serde_duration")]
    pub health_check_interval: Duration,

    /// Bound on a single liveness probe
    #[serde(default = "default_probe_timeout", with = "serde_duration")]
    pub probe_timeout: Duration,
}

fn default_router_addr() -> String {
    DEFAULT_ROUTER_ADDR.to_string()
}

fn default_ttl() -> Duration {
    DEFAULT_TTL
}

fn default_call_timeout() -> Duration {
    DEFAULT_CALL_TIMEOUT
}

fn default_read_header_timeout() -> Duration {
    DEFAULT_ROUTER_READ_HEADER_TIMEOUT
}

fn default_handler_timeout() -> Duration {
    DEFAULT_ROUTER_HANDLER_TIMEOUT
}

fn default_health_check_interval() -> Duration {
    DEFAULT_HEALTH_CHECK_INTERVAL
}

fn default_probe_timeout() -> Duration {
    DEFAULT_PROBE_TIMEOUT
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("invalid config: {}", e)))?;
        Ok(config)
    }

    /// Read and parse a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml)
    }
}

impl RouterConfig {
    /// Reject configurations the router cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.storages.is_empty() {
            return Err(Error::Config("at least one storage is required".into()));
        }
        if self.call_timeout.is_zero() {
            return Err(Error::Config("callTimeout must be greater than 0".into()));
        }
        if self.read_header_timeout.is_zero() {
            return Err(Error::Config("readHeaderTimeout must be greater than 0".into()));
        }
        if self.handler_timeout.is_zero() {
            return Err(Error::Config("handlerTimeout must be greater than 0".into()));
        }

        let mut seen = HashSet::new();
        for (i, storage) in self.storages.iter().enumerate() {
            let addr = storage.addr.trim().trim_end_matches('/');
            if addr.is_empty() {
                return Err(Error::Config(format!("storage #{} has an empty addr", i)));
            }
            if !seen.insert(addr.to_string()) {
                return Err(Error::Config(format!("storage {} is listed twice", addr)));
            }
            if storage.health_check_interval.is_zero() {
                return Err(Error::Config(format!(
                    "storage {}: healthCheckInterval must be greater than 0",
                    addr
                )));
            }
            if storage.probe_timeout.is_zero() {
                return Err(Error::Config(format!(
                    "storage {}: probeTimeout must be greater than 0",
                    addr
                )));
            }
        }
        Ok(())
    }

    /// Router behaviour derived from this config
    pub fn settings(&self) -> RouterSettings {
        RouterSettings {
            default_ttl: self.default_ttl,
            call_timeout: self.call_timeout,
            placement: self.placement,
            prune_on_delete: self.prune_on_delete,
        }
    }

    /// Connection limits for the router's own HTTP server
    pub fn timeouts(&self) -> ServerTimeouts {
        ServerTimeouts {
            read_header: self.read_header_timeout,
            handler: self.handler_timeout,
        }
    }
}
