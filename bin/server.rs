// SAKAN - Web Server
// JSON API for the web and mobile clients

use anyhow::{Context, Result};
use sakan::api::{router, AppState};
use sakan::{open_database, Config, LogMailer};
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("🌐 SAKAN - Web Server");
    let config = Config::from_env()?;

    let conn = open_database(Path::new(&config.database_path))?;
    let address = format!("0.0.0.0:{}", config.port);
    let public_url = config.public_url.clone();

    // Create shared state
    let state = AppState::new(conn, config, Arc::new(LogMailer));
    let app = router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind to {address}"))?;

    info!("🚀 Server running on {address}");
    info!("   API: {public_url}/api/health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
