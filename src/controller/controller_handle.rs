//! Controller Handle - lifecycle of the pad input pipeline
//!
//! Owns the claimed GPIO lines and the change publisher task:
//!
//! ```text
//! PadLines ─[edges]→ FrameDecoder ─[atomic snapshot]→ ChangePublisher ─[ButtonEvent]→ sender
//! (interrupt threads)                                   (tokio task)
//! ```

use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::buttons::ButtonEvent;
use super::change_publisher::{sample_period, PublisherHandle, DEFAULT_SAMPLE_HZ};
use super::frame_decoder::{FrameDecoder, FrameStats};
use super::pins::{PadLines, PinAssignment, PinError};

/// Configuration of the pad input pipeline
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// BCM pin numbers of Clock, Latch and Data
    pub pins: PinAssignment,

    /// Change publisher cadence in Hz
    pub sample_hz: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            pins: PinAssignment::default(),
            sample_hz: DEFAULT_SAMPLE_HZ,
        }
    }
}

impl ControllerSettings {
    /// Time between two sampled frames
    pub fn sample_period(&self) -> Duration {
        sample_period(self.sample_hz)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Lines could not be claimed or armed; the wiring or permissions are wrong
    #[error("Pad line error: {0}")]
    Pins(#[from] PinError),

    #[error("Initialization error: {0}")]
    InitializationError(String),
}

pub struct ControllerHandle {
    decoder: Arc<FrameDecoder>,
    lines: PadLines,
    publisher: PublisherHandle,
}

impl ControllerHandle {
    /// Claim the pad lines and start publishing button events into `sender`
    ///
    /// Fails when any line cannot be claimed. The publisher stops when `cancel`
    /// fires or the receiving side of `sender` is dropped.
    pub fn spawn(
        settings: &ControllerSettings,
        sender: mpsc::Sender<ButtonEvent>,
        cancel: CancellationToken,
    ) -> Result<Self, ControllerError> {
        info!("Initializing controller with settings: {:?}", settings);
        if settings.sample_hz == 0 {
            return Err(ControllerError::InitializationError(
                "sample_hz must be greater than zero".to_string(),
            ));
        }

        let decoder = Arc::new(FrameDecoder::new());
        let lines = PadLines::claim(settings.pins, decoder.clone())?;
        debug!("Frame decoder attached to pad lines");

        let publisher = PublisherHandle::spawn(decoder.clone(), sender, settings.sample_hz, cancel);

        info!("Controller initialized");
        Ok(Self {
            decoder,
            lines,
            publisher,
        })
    }

    pub fn stats(&self) -> FrameStats {
        self.decoder.stats()
    }

    /// Release the pad lines and wait for the publisher to finish
    ///
    /// The publisher only stops once the cancellation token passed to `spawn`
    /// has fired.
    pub async fn shutdown(self) {
        let Self {
            decoder,
            lines,
            publisher,
        } = self;
        lines.release();
        publisher.join().await;
        info!("Controller shut down, frame stats {:?}", decoder.stats());
    }
}
