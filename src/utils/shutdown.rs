use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Returns a token cancelled on SIGTERM or SIGINT.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT, initiating graceful shutdown"),
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler, listening for SIGINT only");
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received SIGINT, initiating graceful shutdown");
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C, initiating graceful shutdown");
    }
}
