use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Resolve on Ctrl+C or SIGTERM
pub async fn signal_received() {
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            warn!("SIGTERM handler unavailable: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Ctrl+C handler failed: {}", e);
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Ctrl+C handler failed: {}", e);
            }
            info!("Ctrl+C received");
        }
        _ = terminate.recv() => info!("SIGTERM received"),
    }
}
