#![forbid(unsafe_code)]

use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancel `token` on the first SIGINT or SIGTERM.
///
/// Work in flight is not interrupted; the scanner and the termination batch
/// observe the token at their next checkpoint.
pub async fn cancel_on_signal(token: CancellationToken) -> std::io::Result<()> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        _ = interrupt.recv() => info!("SIGINT received, cancelling"),
        _ = terminate.recv() => info!("SIGTERM received, cancelling"),
        _ = token.cancelled() => return Ok(()),
    }
    token.cancel();
    Ok(())
}
