mod config;
mod handlers;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use sse_stream::{build_relay_client, metrics::init_metrics};

use config::{Config, LoggingConfig};
use handlers::AppState;

/// Demo server for timed and relayed Server-Sent Events.
#[derive(Parser, Debug)]
#[command(name = "sse-demo")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Override listen address.
    #[arg(short, long)]
    listen: Option<String>,

    /// Override the event label of the /source stream.
    #[arg(short, long)]
    event: Option<String>,

    /// Enable debug logging.
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_ref())?;

    // Apply CLI overrides
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(event) = args.event {
        config.source.stream.event = Some(event);
        config.validate()?;
    }
    if args.debug {
        config.logging.level = "debug".to_string();
    }

    init_logging(&config.logging)?;

    tracing::info!(
        listen_addr = %config.server.listen_addr,
        interval_ms = config.source.interval_ms,
        duration_ms = config.source.duration_ms,
        "Starting SSE demo"
    );

    init_metrics();

    if config.metrics.enabled {
        let addr = config.metrics.listen_addr.parse()?;
        start_metrics_server(addr)?;
    }

    let state = Arc::new(AppState {
        client: build_relay_client(&config.relay)?,
        source: config.source.clone(),
        upstreams: config.upstreams.clone(),
    });

    let app = Router::new()
        .route("/source", get(handlers::source))
        .route("/relay", get(handlers::relay))
        .route("/health", get(handlers::health))
        .with_state(state);

    let listener = TcpListener::bind(&config.server.listen_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Demo listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!(
        active_streams = sse_stream::metrics::active_streams(),
        "Demo stopped"
    );
    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    match config.format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }

    Ok(())
}

/// Install the Prometheus recorder with an HTTP scrape endpoint.
fn start_metrics_server(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics server: {}", e))?;

    tracing::info!(%addr, "Metrics server started");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "Failed to register signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT, initiating shutdown"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating shutdown"),
    }
}
