use anyhow::Result;
use tracing::{error, info};

use camgate_api::{create_router, AppState};

/// Bind the HTTP listener and serve until SIGINT/SIGTERM. In-flight
/// requests are allowed to finish.
pub async fn run(state: AppState) -> Result<()> {
    let http_addr = state.config.http_address();
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .map_err(|e| {
            error!("Failed to bind HTTP address {}: {}", http_addr, e);
            anyhow::anyhow!("Failed to bind {http_addr}: {e}")
        })?;

    info!("HTTP server listening on {}", http_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("HTTP server error: {e}"))?;

    info!("HTTP server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
