//! Folio proxy server
//!
//! Serves a working tree on local disk (or an in-memory repo) through the
//! proxy transport, so the editor can run against content without any git
//! hosting account.
//!
//! Usage:
//!   folio-proxy --root ./site --port 8081

use anyhow::{Context, Result};
use clap::Parser;
use folio_backend::{BackendConfig, BackendRegistry, Credentials};
use folio_proxy::{API_PATH, build_router};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "folio-proxy")]
#[command(about = "Serve a local Folio site through the proxy backend")]
struct Args {
    /// Port for the HTTP API
    #[arg(short, long, default_value = "8081")]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Site root on disk
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Backend to serve: `local` or `test-repo`
    #[arg(short, long, default_value = "local")]
    backend: String,

    /// Published branch name
    #[arg(long, default_value = "main")]
    branch: String,

    /// Folder for media uploads
    #[arg(long, default_value = "static/media")]
    media_folder: String,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("Site root {} does not exist", args.root.display()))?;

    let mut config = BackendConfig::new(&args.backend, "").with_branch(args.branch.as_str());
    config.local_root = Some(root.clone());
    config.media_folder = args.media_folder.clone();

    let backend = BackendRegistry::with_builtin()
        .create(&config, Credentials::default())
        .await
        .with_context(|| format!("Failed to create the {} backend", args.backend))?;

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", args.host, args.port))?;
    let address = listener.local_addr()?;

    info!("Serving {} from {}", backend.name(), root.display());
    info!("Proxy endpoint: http://{}{}", address, API_PATH);

    axum::serve(listener, build_router(backend))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;
    Ok(())
}
