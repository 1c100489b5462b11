//! Shutdown signal handling.

use tokio::signal;
use tracing::info;

/// Waits for the signal that starts a graceful shutdown of the bridge.
///
/// # Platform Support
///
/// * **Unix platforms**: SIGINT and SIGTERM
/// * **Windows**: Ctrl+C
///
/// # Returns
///
/// `Ok(())` once a signal arrives, or the I/O error raised while installing
/// the signal handlers.
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    wait_for_shutdown_signal_silent().await?;
    info!("📡 Received shutdown signal - initiating graceful shutdown");
    Ok(())
}

/// Same as [`wait_for_shutdown_signal`] without the log line; used to catch
/// the second signal that forces an immediate exit.
pub async fn wait_for_shutdown_signal_silent() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => ()
        }
    }

    #[cfg(windows)]
    signal::ctrl_c().await?;

    Ok(())
}
