//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for SIGINT / SIGTERM (ctrl-c on non-unix platforms)
//! - Nothing else is handled; other signals keep their default disposition

/// Completes when the process receives a termination signal.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => tracing::info!(signal = "SIGINT", "Shutdown signal received"),
        _ = sigterm.recv() => tracing::info!(signal = "SIGTERM", "Shutdown signal received"),
    }
    Ok(())
}

#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    tracing::info!(signal = "ctrl-c", "Shutdown signal received");
    Ok(())
}

/// Like [`wait_for_shutdown_signal`], but never completes if the handlers
/// cannot be installed, leaving cancellation to the context alone.
pub async fn shutdown_signal() {
    if let Err(e) = wait_for_shutdown_signal().await {
        tracing::error!(error = %e, "Failed to install signal handlers");
        std::future::pending::<()>().await;
    }
}
