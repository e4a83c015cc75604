//! CloudTunes -- music listing and streaming server.
//!
//! Lists the audio files of a cloud storage folder with their cover art
//! and proxies playback with range support. SIGTERM/SIGINT stop accepting
//! connections and wait up to `server.shutdown_timeout` for in-flight
//! streams before exiting.

use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::Notify;
use tracing::{info, warn};

use cloudtunes::config::{self, Config};
use cloudtunes::credentials::{CredentialProvider, RefreshTokenProvider};
use cloudtunes::drive::DriveClient;
use cloudtunes::AppState;

/// Command-line arguments for the CloudTunes server.
#[derive(Parser, Debug)]
#[command(
    name = "cloudtunes",
    version,
    about = "Music listing and streaming over a cloud storage folder"
)]
struct Cli {
    /// Path to a YAML configuration file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    if config.logging.use_json(config.server.environment) {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load(cli.config.as_deref())?;
    init_tracing(&config);
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {}", path.display());
    }
    config.validate_credentials()?;

    let bind_addr = cli.bind.unwrap_or_else(|| config.server.bind_address());

    if config.observability.metrics {
        cloudtunes::metrics::init_metrics()?;
        cloudtunes::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // No overall request timeout: proxied streams last as long as playback.
    let client = reqwest::Client::builder()
        .user_agent(concat!("cloudtunes/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(RefreshTokenProvider::new(client.clone(), &config.google));
    let drive = DriveClient::new(client, config.google.api_base.clone());
    info!(
        "Drive client initialized: api_base={} default_folder={}",
        config.google.api_base, config.library.default_folder_id
    );

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(AppState {
        config,
        credentials,
        drive,
    });
    let app = cloudtunes::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("CloudTunes listening on {}", bind_addr);

    let stopping = Arc::new(Notify::new());
    let signal_stopping = stopping.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_stopping.notify_one();
        })
        .into_future();

    let deadline = async {
        stopping.notified().await;
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = server => result?,
        _ = deadline => {
            warn!("Shutdown timeout of {:?} elapsed, dropping open streams", shutdown_timeout);
        }
    }

    info!("CloudTunes stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}
