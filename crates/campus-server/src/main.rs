//! `campus-server` binary.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP export).
//! 3. Derive the field [`Cipher`] from the configured secret.
//! 4. Open the record store (snapshot-backed when `DATA_FILE` is set) and
//!    bound every call with the store timeout.
//! 5. Build the Axum router and start the HTTP server.

mod codec;
mod config;
mod crypto;
mod server;
mod service;
mod store;
mod telemetry;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tracing::info;

use config::Config;
use crypto::Cipher;
use server::state::AppState;
use store::{BoundedStore, MemoryStore, RecordStore};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        persistent = cfg.data_file.is_some(),
        "campus-entry starting"
    );

    // -----------------------------------------------------------------------
    // 3. Cipher
    // -----------------------------------------------------------------------
    let cipher = Cipher::from_secret(&cfg.cipher_secret).context("invalid CIPHER_SECRET")?;

    // -----------------------------------------------------------------------
    // 4. Record store
    // -----------------------------------------------------------------------
    let backing: Arc<dyn RecordStore> = match &cfg.data_file {
        Some(path) => Arc::new(MemoryStore::open(path).await?),
        None => Arc::new(MemoryStore::new()),
    };
    let store = BoundedStore::new(backing, Duration::from_millis(cfg.store_timeout_ms));

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(Arc::new(store), Arc::new(cipher));
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("campus-entry stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
