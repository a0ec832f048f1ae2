//! Confstore Server
//!
//! Stores uploaded files as numbered, deduplicated versions per identifier,
//! with download, hash lookup, deletion and adjacent-version diffs over HTTP.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use confstore_server::config::Config;
use confstore_server::routes;
use confstore_server::state::AppState;
use confstore_server::store::{LoadSource, VersionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "confstore_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    tracing::info!("Starting Confstore Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Snapshot file: {}", config.storage.snapshot_path.display());
    tracing::info!("Blob directory: {}", config.storage.blob_dir.display());

    // Load the index, rebuilding from blobs if the snapshot is unusable
    let (store, source) = VersionStore::open(&config.storage)
        .await
        .context("failed to open version store")?;
    if let LoadSource::Rebuilt(report) = &source {
        if !report.skipped.is_empty() {
            tracing::warn!(
                skipped = report.skipped.len(),
                "Serving with a partial index; some blobs could not be restored"
            );
        }
    }

    let addr: SocketAddr = tokio::net::lookup_host((config.server.host.as_str(), config.server.port))
        .await
        .context("failed to resolve listen address")?
        .next()
        .with_context(|| format!("no address found for {}", config.server.host))?;
    let tls = config.server.tls.clone();

    let app = routes::router(AppState::new(config, store));

    match tls {
        Some(tls) => {
            let rustls = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
                .await
                .context("failed to load TLS certificate/key")?;

            let handle = Handle::new();
            tokio::spawn(shutdown_handle(handle.clone()));

            tracing::info!("Confstore Server listening on https://{}", addr);
            axum_server::bind_rustls(addr, rustls)
                .handle(handle)
                .serve(app.into_make_service())
                .await
                .context("server error")?;
        }
        None => {
            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {}", addr))?;

            tracing::info!("Confstore Server listening on http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("server error")?;
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Trigger graceful shutdown of a TLS server on Ctrl+C / SIGTERM
async fn shutdown_handle(handle: Handle) {
    shutdown_signal().await;
    handle.graceful_shutdown(Some(Duration::from_secs(5)));
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
