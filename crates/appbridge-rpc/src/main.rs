//! AppBridge RPC Server - JSON-RPC front end for the content-app host.
//!
//! This binary opens a [`ContentAppHost`](appbridge_core::ContentAppHost) on a
//! data directory and exposes discovery, endpoint management, routing and
//! agent binding over JSON-RPC 2.0 on HTTP.

mod handlers;
mod server;

use anyhow::Result;
use appbridge_core::{ContentAppHost, RouteMode};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "appbridge-rpc")]
#[command(about = "JSON-RPC server for the AppBridge content-app host")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value = "0")]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Data directory (defaults to the per-user data directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Answer requests for unknown endpoints instead of rejecting them
    #[arg(long)]
    permissive: bool,

    /// Dispatch deadline in milliseconds (0 = no deadline)
    #[arg(long)]
    dispatch_timeout_ms: Option<u64>,

    /// Watch the packages directory for installs and uninstalls
    #[arg(short, long)]
    watch: bool,

    /// Bind to the trusted agent on startup
    #[arg(long)]
    bind_agent: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting AppBridge RPC Server");

    let data_dir = match args.data_dir {
        Some(path) => path,
        None => appbridge_core::platform::default_data_dir()?,
    };
    info!("Data directory: {}", data_dir.display());

    let mut builder = ContentAppHost::builder(&data_dir)
        .auto_create_dirs(true)
        .watch_packages(args.watch);
    if args.permissive {
        builder = builder.route_mode(RouteMode::Permissive);
    }
    if let Some(ms) = args.dispatch_timeout_ms {
        builder = builder.dispatch_timeout((ms > 0).then(|| Duration::from_millis(ms)));
    }
    let host = builder.build().await?;

    if args.bind_agent && !host.bind_agent() {
        warn!("No trusted agent service found, routing to live apps is unavailable");
    }

    let (addr, state) = server::start_server(host, &args.host, args.port).await?;

    // Print port for the parent process to read (intentional stdout for IPC)
    println!("RPC_PORT={}", addr.port());

    info!("RPC server running on {}", addr);

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, exiting");
        }
        _ = state.shutdown_requested() => {
            info!("Shutdown requested over RPC, exiting");
        }
    }

    state.host.unbind_agent();
    Ok(())
}
