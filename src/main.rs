//! StickyCache
//!
//! One binary, two roles:
//!
//! ```text
//! stickycache node   --addr localhost:8181 --ttl 10m
//! stickycache router --config ./config/router.yaml
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stickycache::adapters::build_client;
use stickycache::config::Config;
use stickycache::domain::ports::Storage;
use stickycache::duration::{format_duration, parse_duration};
use stickycache::server::{self, run_node_server, run_router_server, ServerTimeouts};
use stickycache::task::stop_all;
use stickycache::{
    HealthMonitor, Liveness, RemoteStorage, Result, Router, ShardIndex, StorageNode,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// StickyCache - distributed ephemeral key/value cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    /// Force debug logging
    #[arg(long, env = "DEBUG", global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a storage node
    Node(NodeArgs),
    /// Run the router in front of the configured storage nodes
    Router(RouterArgs),
}

#[derive(Args, Debug)]
struct NodeArgs {
    /// Listen address
    #[arg(long, env = "HTTP_ADDRESS", default_value = "localhost:8181")]
    addr: String,

    /// TTL applied to writes that carry none
    #[arg(long, env = "TTL", default_value = "10m", value_parser = parse_duration)]
    ttl: Duration,

    /// Disconnect clients that have not sent complete headers within this
    #[arg(long, env = "READ_HEADER_TIMEOUT", default_value = "200ms", value_parser = parse_duration)]
    read_header_timeout: Duration,

    /// Answer 503 when a request takes longer than this
    #[arg(long, env = "HANDLER_TIMEOUT", default_value = "1s", value_parser = parse_duration)]
    handler_timeout: Duration,
}

#[derive(Args, Debug)]
struct RouterArgs {
    /// Path to the router YAML config
    #[arg(long, env = "CONFIG_PATH", default_value = "./config/router.yaml")]
    config: PathBuf,

    /// Listen address, overrides the config file
    #[arg(long, env = "ROUTER_ADDRESS")]
    addr: Option<String>,

    /// Default TTL, overrides the config file
    #[arg(long, env = "DEFAULT_TTL", value_parser = parse_duration)]
    default_ttl: Option<Duration>,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli);

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal.cancel();
    });

    let result = match cli.command {
        Command::Node(args) => run_node(args, shutdown).await,
        Command::Router(args) => run_router(args, shutdown).await,
    };

    if let Err(e) = &result {
        error!("Exiting with error: {}", e);
    }
    result
}

async fn run_node(args: NodeArgs, shutdown: CancellationToken) -> Result<()> {
    let node = Arc::new(StorageNode::with_default_ttl(args.ttl));

    info!("Starting storage node");
    info!("  Address: {}", args.addr);
    info!("  Default TTL: {}", format_duration(node.default_ttl()));
    info!("  Read header timeout: {}", format_duration(args.read_header_timeout));
    info!("  Handler timeout: {}", format_duration(args.handler_timeout));

    let timeouts = ServerTimeouts {
        read_header: args.read_header_timeout,
        handler: args.handler_timeout,
    };
    let sweeper = node.start(&shutdown);

    let listener = server::bind(&args.addr).await?;
    let result = run_node_server(listener, node, timeouts, shutdown.clone()).await;

    shutdown.cancel();
    sweeper.stop().await;
    info!("Storage node shutdown complete");
    result
}

async fn run_router(args: RouterArgs, shutdown: CancellationToken) -> Result<()> {
    let mut config = Config::load(&args.config)?.router;
    if let Some(addr) = args.addr {
        config.addr = addr;
    }
    if let Some(ttl) = args.default_ttl {
        config.default_ttl = ttl;
    }
    config.validate()?;

    info!("Starting router");
    info!("  Config: {}", args.config.display());
    info!("  Address: {}", config.addr);
    info!("  Storages: {}", config.storages.len());
    info!("  Default TTL: {}", format_duration(config.default_ttl));
    info!("  Call timeout: {}", format_duration(config.call_timeout));
    info!("  Handler timeout: {}", format_duration(config.handler_timeout));

    let client = build_client(config.call_timeout)?;

    let mut shards: Vec<Arc<dyn Storage>> = Vec::with_capacity(config.storages.len());
    let mut monitors = Vec::with_capacity(config.storages.len());
    for storage in &config.storages {
        let liveness = Liveness::new();
        let remote = Arc::new(RemoteStorage::new(
            &storage.addr,
            client.clone(),
            liveness.clone(),
            storage.probe_timeout,
        ));
        monitors.push(HealthMonitor::new(
            remote.clone(),
            liveness,
            storage.health_check_interval,
        ));
        shards.push(remote);
    }

    // Every flag holds a real probe result before the first request
    let monitors = join_all(monitors.into_iter().map(|m| m.start(&shutdown))).await;

    let router = Arc::new(Router::new(shards, ShardIndex::new(), config.settings()));
    info!("{} of {} storages alive", router.alive_shards(), router.shards().len());

    let result = match server::bind(&config.addr).await {
        Ok(listener) => {
            run_router_server(listener, router, config.timeouts(), shutdown.clone()).await
        }
        Err(e) => Err(e),
    };

    shutdown.cancel();
    stop_all(monitors).await;
    info!("Router shutdown complete");
    result
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(cli: &Cli) {
    let level = if cli.debug {
        Level::DEBUG
    } else {
        match cli.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let filter = ["hyper=warn", "hyper_util=warn", "reqwest=warn", "h2=warn"]
        .iter()
        .filter_map(|directive| directive.parse().ok())
        .fold(
            EnvFilter::from_default_env().add_directive(level.into()),
            |filter, directive| filter.add_directive(directive),
        );

    if cli.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
