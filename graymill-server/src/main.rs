//! Graymill server binary: parse flags, load config, wire the filter
//! client, and serve the upload endpoint.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use graymill_server::{create_router, ApiState, FilterClient, RelaySettings, ServerConfig};

/// HTTP front-end relaying video uploads through the filter service
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to a TOML config file merged over the built-in defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Filter service endpoint, e.g. http://localhost:50051 (overrides config)
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Bytes per chunk on the duplex call (overrides config)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Bound on total relay duration in seconds (overrides config)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Use TLS with native roots for the filter connection
    #[arg(long)]
    tls: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli
        .log_level
        .parse::<Level>()
        .context("invalid log level")?;
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.http.port = port;
    }
    if let Some(endpoint) = cli.endpoint {
        config.remote.endpoint = endpoint;
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.relay.chunk_size = chunk_size;
    }
    if let Some(timeout_secs) = cli.timeout_secs {
        config.relay.timeout_secs = Some(timeout_secs);
    }
    if cli.tls {
        config.remote.tls = true;
    }

    let client = FilterClient::new(&config.remote).context("building filter client")?;
    let state = ApiState::new(client, RelaySettings::from_config(&config));
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(%addr, endpoint = %config.remote.endpoint, "graymill server listening");
    axum::serve(listener, app)
        .await
        .context("server error")?;

    Ok(())
}
