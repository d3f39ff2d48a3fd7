//! Shutdown signal handling.

use tokio::signal;

/// Resolves on Ctrl+C, or SIGTERM on unix.
///
/// If a handler cannot be installed, that signal is never observed and the
/// server keeps running until the other one fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => tracing::warn!("Received Ctrl+C, shutting down gracefully..."),
        _ = terminate => tracing::warn!("Received terminate signal, shutting down gracefully..."),
    }
}
