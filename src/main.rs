//! http-kit server.
//!
//! ```text
//!     Client ──▶ request id ──▶ TraceLayer ──▶ TimeoutLayer ──▶ origin middleware ──▶ handler
//!                                                                   │
//!                                                      trusted proxy? X-Forwarded-*
//!                                                      host allowed? else 400
//! ```
//!
//! Configuration comes from a TOML file (`--config`, or `HTTP_KIT_CONFIG`).
//! Without one, defaults are used and nothing is reloaded.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use http_kit::config::{load_config, ConfigWatcher, KitConfig};
use http_kit::lifecycle::{wait_for_signal, Shutdown};
use http_kit::observability::logging;
use http_kit::HttpServer;

#[derive(Parser)]
#[command(name = "http-kit")]
#[command(about = "Proxy-aware HTTP toolkit server", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "HTTP_KIT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => KitConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    logging::init(&config.observability)?;
    tracing::info!("http-kit v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address,
        encrypted = config.listener.encrypted,
        request_timeout_secs = config.timeouts.request_secs,
        files_root = ?config.files.root,
        "Configuration loaded"
    );
    if config.cookies.secret.is_empty() {
        tracing::warn!("No cookie secret configured, /session will answer 500");
    }

    // The watcher handle must outlive the server for updates to flow.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        None => (None, mpsc::unbounded_channel().1),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config);
    let serving = server.run(listener, config_updates, shutdown.subscribe());

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(signal) => {
                tracing::info!(signal, "Stopping");
                trigger.trigger();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for signals"),
        }
    });

    serving.await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
