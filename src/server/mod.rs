//! HTTP Servers
//!
//! Thin request layers in front of a [`crate::node::StorageNode`] and a
//! [`crate::router::Router`]. Both speak the same key/ttl query-parameter
//! contract; the node additionally answers liveness probes.
//!
//! | Path            | Node | Router | Method |
//! |-----------------|------|--------|--------|
//! | `/get`          | yes  | yes    | GET    |
//! | `/set`          | yes  | yes    | POST   |
//! | `/delete`       | yes  | yes    | DELETE |
//! | `/health-check` | yes  |        | GET    |
//! | `/healthz`      |      | yes    | GET    |
//! | `/metrics`      | yes  | yes    | GET    |

mod node;
mod params;
mod router;

pub use node::run_node_server;
pub use params::{extract_key, extract_key_and_ttl};
pub use router::run_router_server;

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::CONTENT_TYPE;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

pub(crate) type HttpResponse = Response<Full<Bytes>>;

/// Default bound on receiving a request's headers at a storage node
pub const DEFAULT_NODE_READ_HEADER_TIMEOUT: Duration = Duration::from_millis(200);

/// Default bound on producing a storage node response
pub const DEFAULT_NODE_HANDLER_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on receiving a request's headers at the router
pub const DEFAULT_ROUTER_READ_HEADER_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on producing a router response, failover scan included
pub const DEFAULT_ROUTER_HANDLER_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-connection limits applied by [`serve`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTimeouts {
    /// A client that has not sent complete headers by then is disconnected
    pub read_header: Duration,
    /// A request whose handler runs longer is answered with 503
    pub handler: Duration,
}

impl ServerTimeouts {
    /// Limits used by storage nodes unless configured otherwise
    pub fn node() -> Self {
        Self {
            read_header: DEFAULT_NODE_READ_HEADER_TIMEOUT,
            handler: DEFAULT_NODE_HANDLER_TIMEOUT,
        }
    }

    /// Limits used by the router unless configured otherwise
    pub fn router() -> Self {
        Self {
            read_header: DEFAULT_ROUTER_READ_HEADER_TIMEOUT,
            handler: DEFAULT_ROUTER_HANDLER_TIMEOUT,
        }
    }
}

/// Bind a listener, accepting host names such as `localhost:8181`
pub async fn bind(addr: &str) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {}: {}", addr, e)))
}

/// Accept HTTP/1 connections on `listener` until `cancel` fires
pub async fn serve<H, F>(
    listener: TcpListener,
    handler: H,
    timeouts: ServerTimeouts,
    cancel: CancellationToken,
) -> Result<()>
where
    H: Fn(Request<Incoming>) -> F + Clone + Send + Sync + 'static,
    F: Future<Output = HttpResponse> + Send + 'static,
{
    let local = listener.local_addr()?;
    info!("HTTP server listening on {}", local);

    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => {
                info!("HTTP server on {} shutting down", local);
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("HTTP server accept error: {}", e);
                    continue;
                }
            },
        };

        let io = TokioIo::new(stream);
        let handler = handler.clone();
        let cancel = cancel.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let handler = handler.clone();
                async move { Ok::<_, Infallible>(bounded(handler(req), timeouts.handler).await) }
            });

            let mut builder = http1::Builder::new();
            builder
                .timer(TokioTimer::new())
                .header_read_timeout(timeouts.read_header);
            let conn = builder.serve_connection(io, service);
            tokio::pin!(conn);

            // Keep-alive connections must not outlive the server
            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = cancel.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(e) = result {
                debug!("HTTP connection error: {}", e);
            }
        });
    }
}

/// Run one handler, answering 503 when it overruns `limit`
async fn bounded<F>(response: F, limit: Duration) -> HttpResponse
where
    F: Future<Output = HttpResponse>,
{
    match tokio::time::timeout(limit, response).await {
        Ok(response) => response,
        Err(_) => {
            warn!("request handler exceeded {:?}", limit);
            text(StatusCode::SERVICE_UNAVAILABLE, "request timed out")
        }
    }
}

/// Plain response with `status` and `body`
pub(crate) fn text(status: StatusCode, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

/// Status a caller sees for an error
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Invalid(_) | Error::DurationParse(_) => StatusCode::BAD_REQUEST,
        Error::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        Error::Timeout { .. } | Error::Transport { .. } | Error::ShardResponse { .. } => {
            StatusCode::BAD_GATEWAY
        }
        Error::Exhausted { .. }
        | Error::Config(_)
        | Error::Io(_)
        | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Log `err` and turn it into a response carrying its text
pub(crate) fn error_response(err: &Error) -> HttpResponse {
    let status = status_for(err);
    if err.is_not_found() {
        debug!("{}", err);
    } else {
        error!("{}", err);
    }
    text(status, err.to_string())
}

/// Read the whole request body
pub(crate) async fn read_body(req: Request<Incoming>) -> Result<Bytes> {
    req.into_body()
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| Error::Internal(format!("cannot read value from body: {}", e)))
}

/// Prometheus text exposition
pub(crate) fn metrics_response() -> HttpResponse {
    let (body, content_type) = crate::metrics::encode();
    let mut response = text(StatusCode::OK, body);
    if let Ok(value) = content_type.parse() {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}
