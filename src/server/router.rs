//! Router HTTP server.

use std::fmt::Write as _;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::params::{extract_key, extract_key_and_ttl};
use super::{error_response, metrics_response, read_body, serve, text, HttpResponse, ServerTimeouts};
use crate::error::Result;
use crate::router::Router;

/// Serve `router` on `listener` until `cancel` fires
pub async fn run_router_server(
    listener: TcpListener,
    router: Arc<Router>,
    timeouts: ServerTimeouts,
    cancel: CancellationToken,
) -> Result<()> {
    serve(listener, move |req| handle(router.clone(), req), timeouts, cancel).await
}

async fn handle(router: Arc<Router>, req: Request<Incoming>) -> HttpResponse {
    debug!("{} {}", req.method(), req.uri());

    let result = match (req.method(), req.uri().path()) {
        (&Method::GET, "/get") => get(&router, &req).await,
        (&Method::POST, "/set") => set(&router, req).await,
        (&Method::DELETE, "/delete") => delete(&router, &req).await,
        (&Method::GET, "/healthz") => Ok(healthz(&router)),
        (&Method::GET, "/metrics") => Ok(metrics_response()),
        (_, "/get" | "/set" | "/delete" | "/healthz" | "/metrics") => {
            Ok(text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"))
        }
        _ => Ok(text(StatusCode::NOT_FOUND, "Not Found")),
    };

    result.unwrap_or_else(|e| error_response(&e))
}

async fn get(router: &Router, req: &Request<Incoming>) -> Result<HttpResponse> {
    let key = extract_key(req.uri())?;
    let value = router.get(&key).await?;
    Ok(text(StatusCode::OK, value))
}

async fn set(router: &Router, req: Request<Incoming>) -> Result<HttpResponse> {
    let (key, ttl) = extract_key_and_ttl(req.uri())?;
    let value = read_body(req).await?;
    router.set(&key, value, ttl).await?;
    Ok(text(StatusCode::OK, ""))
}

async fn delete(router: &Router, req: &Request<Incoming>) -> Result<HttpResponse> {
    let key = extract_key(req.uri())?;
    router.delete(&key).await?;
    Ok(text(StatusCode::OK, ""))
}

/// 200 while at least one shard is alive, 503 otherwise. The body lists
/// every shard with its flag and the number of keys indexed to it.
fn healthz(router: &Router) -> HttpResponse {
    let shards = router.shards();
    let keys = router.index().distribution(shards.len());

    let mut body = String::new();
    for (shard, keys) in shards.iter().zip(keys) {
        let state = if shard.is_alive() { "alive" } else { "dead" };
        let _ = writeln!(body, "{} {} keys={}", shard.addr(), state, keys);
    }

    let status = if router.alive_shards() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    text(status, body)
}
