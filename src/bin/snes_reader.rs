//! Hardware side: pad lines to FIFO tokens and light toggles

use color_eyre::{eyre::eyre, Result};
use snes_link::config::Settings;
use snes_link::controller::ControllerHandle;
use snes_link::dispatch::HandoffWriter;
use snes_link::lights::LightSwitch;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const EVENT_QUEUE: usize = 64;

#[tokio::main]
async fn main() -> Result<()> {
    snes_link::telemetry::setup()?;

    let settings = Settings::load()?;
    let dispatcher = settings.dispatch.dispatcher(settings.controller.sample_period())?;
    let cancel = CancellationToken::new();

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
    let controller = ControllerHandle::spawn(&settings.controller, event_tx, cancel.clone())
        .map_err(|e| eyre!("Failed to spawn controller: {}", e))?;

    let lights = LightSwitch::connect(&settings.lights, cancel.clone());
    if lights.is_none() {
        info!("MQTT lights not configured, X and Y do nothing");
    }

    let writer = HandoffWriter::new(&settings.fifo_path);
    info!("Writing tokens to {}", settings.fifo_path.display());
    let dispatch = tokio::spawn(dispatcher.run(event_rx, writer, lights, cancel.clone()));

    snes_link::shutdown::signal_received().await;
    info!("Shutting down");
    cancel.cancel();

    let stats = controller.stats();
    controller.shutdown().await;

    match dispatch.await {
        Ok((mut writer, lights)) => {
            writer.close();
            if let Some(lights) = lights {
                lights.shutdown().await;
            }
        }
        Err(e) => warn!("Dispatcher task failed: {}", e),
    }

    info!(
        "Reader stopped: {} frames, {} short, {} overruns",
        stats.complete, stats.short, stats.overrun
    );
    Ok(())
}
