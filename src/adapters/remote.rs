//! Remote Storage Adapter
//!
//! Implements the `Storage` and `Probe` ports for a storage node reached over
//! HTTP.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};

use crate::domain::ports::{Liveness, Probe, Storage};
use crate::duration::format_duration;
use crate::error::{Error, Result};

const SET_ENDPOINT: &str = "set";
const GET_ENDPOINT: &str = "get";
const DELETE_ENDPOINT: &str = "delete";
const HEALTH_CHECK_ENDPOINT: &str = "health-check";

/// Default bound on a liveness probe
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

/// Build the HTTP client shared by every remote shard
pub fn build_client(connect_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// HTTP client for one storage node
pub struct RemoteStorage {
    addr: String,
    client: Client,
    liveness: Liveness,
    probe_timeout: Duration,
}

impl RemoteStorage {
    /// Create an adapter for the node at `addr` (e.g. `http://10.0.0.1:8181`).
    ///
    /// The adapter reads `liveness`; whoever probes the node writes it.
    pub fn new(addr: &str, client: Client, liveness: Liveness, probe_timeout: Duration) -> Self {
        let mut addr = addr.trim().to_string();
        if !addr.ends_with('/') {
            addr.push('/');
        }

        Self {
            addr,
            client,
            liveness,
            probe_timeout,
        }
    }

    /// Liveness flag read by this adapter
    pub fn liveness(&self) -> &Liveness {
        &self.liveness
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.addr, endpoint)
    }

    fn transport(&self, source: reqwest::Error) -> Error {
        Error::Transport {
            addr: self.addr.clone(),
            source,
        }
    }

    /// Map a response status onto the error taxonomy
    fn check(&self, key: &str, response: Response) -> Result<Response> {
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(Error::not_found(key)),
            status => Err(Error::ShardResponse {
                addr: self.addr.clone(),
                status: status.as_u16(),
            }),
        }
    }
}

impl std::fmt::Debug for RemoteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStorage")
            .field("addr", &self.addr)
            .field("alive", &self.liveness.is_alive())
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

#[async_trait]
impl Storage for RemoteStorage {
    #[instrument(skip(self), fields(addr = %self.addr))]
    async fn get(&self, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(self.url(GET_ENDPOINT))
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        let response = self.check(key, response)?;
        response.bytes().await.map_err(|e| self.transport(e))
    }

    #[instrument(skip(self, value), fields(addr = %self.addr, len = value.len()))]
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let ttl = format_duration(ttl);
        let response = self
            .client
            .post(self.url(SET_ENDPOINT))
            .query(&[("key", key), ("ttl", ttl.as_str())])
            .body(value)
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        self.check(key, response)?;
        Ok(())
    }

    #[instrument(skip(self), fields(addr = %self.addr))]
    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(DELETE_ENDPOINT))
            .query(&[("key", key)])
            .send()
            .await
            .map_err(|e| self.transport(e))?;

        self.check(key, response)?;
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
impl Probe for RemoteStorage {
    async fn probe(&self) -> bool {
        let result = self
            .client
            .get(self.url(HEALTH_CHECK_ENDPOINT))
            .timeout(self.probe_timeout)
            .send()
            .await;

        match result {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("health check {:?} failed: {}", self.addr, e);
                false
            }
        }
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}
