//! mammoth-link server entry point.
//!
//! Starts the Axum HTTP server with the link WebSocket and REST endpoints,
//! plus the broadcast scheduler.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use mammoth_link::api;
use mammoth_link::app_state::AppState;
use mammoth_link::config::LinkConfig;
use mammoth_link::service::{LinkService, LoggingHandler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = LinkConfig::from_env()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;
    tracing::info!(addr = %config.listen_addr, "starting mammoth-link");

    // Build service layer
    let link = Arc::new(LinkService::new(&config, Arc::new(LoggingHandler)));
    link.load_schema(&config.schema)
        .await
        .context("invalid entity schema")?;
    let broadcaster = link.spawn_broadcaster();

    // Build router
    let app = api::build_app(AppState::new(Arc::clone(&link)));

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("cannot bind {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    let shutdown_link = Arc::clone(&link);
    let shutdown_timeout = config.shutdown_timeout;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("shutdown requested");
        shutdown_link.shutdown(shutdown_timeout).await;
    })
    .await
    .context("server error")?;

    if tokio::time::timeout(config.shutdown_timeout, broadcaster)
        .await
        .is_err()
    {
        tracing::warn!("broadcast scheduler did not stop in time");
    }
    tracing::info!("mammoth-link stopped");
    Ok(())
}

/// Completes on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
