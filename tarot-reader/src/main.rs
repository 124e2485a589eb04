//! tarot-reader - Reading session coordinator service
//!
//! Hosts the crypto-tarot reading coordinator behind a small HTTP + SSE
//! surface. Webhook services are remote; this process holds no database.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tarot_common::config::load_config;
use tarot_common::Environment;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tarot_reader::services::ReqwestTransport;
use tarot_reader::AppState;

/// Command-line arguments for tarot-reader
#[derive(Parser, Debug)]
#[command(name = "tarot-reader")]
#[command(about = "Crypto tarot reading session coordinator")]
#[command(version)]
struct Args {
    /// Path to TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config)
    #[arg(short, long, env = "TAROT_BIND")]
    bind: Option<String>,

    /// Webhook environment: development or production (overrides config)
    #[arg(short, long, env = "TAROT_ENVIRONMENT")]
    environment: Option<Environment>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref());
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(environment) = args.environment {
        config.environment = environment;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("tarot_reader={0},tarot_common={0},tower_http=info", config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tarot-reader (Reading Session Coordinator)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.environment);

    let transport = ReqwestTransport::new(Duration::from_secs(config.request_timeout_secs))
        .context("Failed to create webhook transport")?;

    let state = AppState::new(&config, Arc::new(transport))
        .context("Failed to initialize application state")?;
    state.start_event_listener();
    state.start_store_writer();
    let store = state.store.clone();

    let app = tarot_reader::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_address))?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Err(e) = store.flush() {
        warn!(error = %e, "Failed to write session state on shutdown");
    }
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
