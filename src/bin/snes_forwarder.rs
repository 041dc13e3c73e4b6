//! Network side: FIFO tokens to `input keyevent` on the TV over ADB

use color_eyre::{eyre::eyre, Result};
use snes_link::adb::{AdbKey, AdbTcpConnector};
use snes_link::config::Settings;
use snes_link::forwarding::{EventIntake, Forwarder, ReconnectSupervisor};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const TOKEN_QUEUE: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    snes_link::telemetry::setup()?;

    let settings = Settings::load()?;
    let adb = &settings.adb;
    let key = AdbKey::load(&adb.key_path)
        .map_err(|e| eyre!("Failed to load ADB key {}: {}", adb.key_path.display(), e))?;

    let connector = AdbTcpConnector::new(
        adb.host.clone(),
        adb.port,
        Arc::new(key),
        adb.send_timeout(),
        adb.auth_timeout(),
    );

    let cancel = CancellationToken::new();
    let (supervisor, link) = ReconnectSupervisor::spawn(connector, adb.retry_delay(), cancel.clone());

    let (token_tx, token_rx) = mpsc::channel(TOKEN_QUEUE);
    let intake = tokio::spawn(EventIntake::new(&settings.fifo_path, token_tx, cancel.clone()).run());
    let forwarder = tokio::spawn(Forwarder::new(link, adb.send_timeout(), cancel.clone()).run(token_rx));

    snes_link::shutdown::signal_received().await;
    info!("Shutting down");
    cancel.cancel();

    match intake.await {
        Ok(Ok(accepted)) => info!("Intake read {} tokens", accepted),
        Ok(Err(e)) => warn!("Intake ended: {}", e),
        Err(e) => warn!("Intake task failed: {}", e),
    }
    // No new sessions once the supervisor is gone; the forwarder closes the rest
    supervisor.join().await;
    let stats = forwarder.await?;
    info!(
        "Forwarder stopped: {} delivered, {} dropped",
        stats.delivered, stats.dropped
    );
    Ok(())
}
