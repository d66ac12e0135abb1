use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

/// Cancel the returned token on SIGINT or SIGTERM.
///
/// Only waiting is cancelled. A YARN client that is already running is not
/// signalled and finishes on its own.
pub fn install_shutdown_handler() -> std::io::Result<CancellationToken> {
    let token = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, no longer waiting on submission"),
            _ = sigint.recv() => tracing::info!("Received SIGINT, no longer waiting on submission"),
        }
        cancel.cancel();
    });

    Ok(token)
}
