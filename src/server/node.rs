//! Storage node HTTP server.

use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Method, Request, StatusCode};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::params::{extract_key, extract_key_and_ttl};
use super::{error_response, metrics_response, read_body, serve, text, HttpResponse, ServerTimeouts};
use crate::error::{Error, Result};
use crate::node::StorageNode;

/// Serve `node` on `listener` until `cancel` fires
pub async fn run_node_server(
    listener: TcpListener,
    node: Arc<StorageNode>,
    timeouts: ServerTimeouts,
    cancel: CancellationToken,
) -> Result<()> {
    serve(listener, move |req| handle(node.clone(), req), timeouts, cancel).await
}

async fn handle(node: Arc<StorageNode>, req: Request<Incoming>) -> HttpResponse {
    debug!("{} {}", req.method(), req.uri());

    let result = match (req.method(), req.uri().path()) {
        (&Method::GET, "/get") => get(&node, &req),
        (&Method::POST, "/set") => set(&node, req).await,
        (&Method::DELETE, "/delete") => delete(&node, &req),
        (&Method::GET, "/health-check") => Ok(text(StatusCode::OK, "")),
        (&Method::GET, "/metrics") => Ok(metrics_response()),
        (_, "/get" | "/set" | "/delete" | "/health-check" | "/metrics") => {
            Ok(text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"))
        }
        _ => Ok(text(StatusCode::NOT_FOUND, "Not Found")),
    };

    result.unwrap_or_else(|e| error_response(&e))
}

fn get(node: &StorageNode, req: &Request<Incoming>) -> Result<HttpResponse> {
    let key = extract_key(req.uri())?;
    node.get(&key)
        .map(|value| text(StatusCode::OK, value))
        .ok_or_else(|| Error::not_found(key))
}

async fn set(node: &StorageNode, req: Request<Incoming>) -> Result<HttpResponse> {
    let (key, ttl) = extract_key_and_ttl(req.uri())?;
    let value = read_body(req).await?;
    node.set(&key, value, ttl);
    Ok(text(StatusCode::OK, ""))
}

fn delete(node: &StorageNode, req: &Request<Incoming>) -> Result<HttpResponse> {
    let key = extract_key(req.uri())?;
    node.delete(&key);
    Ok(text(StatusCode::OK, ""))
}
