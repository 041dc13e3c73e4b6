use chrono::{DateTime, Local};
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::buttons::{ButtonEvent, ButtonState};
use super::frame_decoder::FrameDecoder;

/// Default sampling cadence, matching the pad's 60 Hz polling
pub const DEFAULT_SAMPLE_HZ: u32 = 60;

pub(crate) fn sample_period(sample_hz: u32) -> Duration {
    Duration::from_secs(1) / sample_hz.max(1)
}

// Log decoder counters every this many ticks
const STATS_EVERY_TICKS: u64 = 600;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub state: ButtonState,
    pub taken_at: DateTime<Local>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublisherError {
    #[error("Event channel closed")]
    ChannelClosed,
}

/// One sample cycle: `Waiting` takes a snapshot, `Comparing` diffs and emits
#[state]
#[derive(Debug, Clone)]
pub enum PublisherState {
    Waiting,
    Comparing(Snapshot),
}

#[machine]
pub struct ChangePublisher<S: PublisherState> {
    decoder: Arc<FrameDecoder>,
    last_state: ButtonState,
    event_sender: mpsc::Sender<ButtonEvent>,
    emitted: u64,
}

impl<S: PublisherState> ChangePublisher<S> {
    pub fn last_state(&self) -> ButtonState {
        self.last_state
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

impl ChangePublisher<Waiting> {
    pub fn create(decoder: Arc<FrameDecoder>, event_sender: mpsc::Sender<ButtonEvent>) -> Self {
        Self::new(decoder, ButtonState::EMPTY, event_sender, 0)
    }

    pub fn sample(self) -> ChangePublisher<Comparing> {
        let snapshot = Snapshot {
            state: self.decoder.current(),
            taken_at: Local::now(),
        };
        self.transition_with(snapshot)
    }
}

impl ChangePublisher<Comparing> {
    /// Emit the delta against the last delivered state, if any
    ///
    /// A full event queue leaves `last_state` untouched, so the next cycle
    /// diffs against it again and the skipped intermediate state is coalesced.
    pub fn publish(mut self) -> Result<ChangePublisher<Waiting>, PublisherError> {
        let Some(snapshot) = self.get_state_data().cloned() else {
            warn!("Comparing state without snapshot");
            return Ok(self.transition());
        };

        if let Some(event) = ButtonEvent::between(self.last_state, snapshot.state, snapshot.taken_at)
        {
            match self.event_sender.try_send(event) {
                Ok(()) => {
                    debug!("Button state {:?} -> {:?}", self.last_state, snapshot.state);
                    self.last_state = snapshot.state;
                    self.emitted += 1;
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("Event queue full, coalescing into next sample");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    return Err(PublisherError::ChannelClosed);
                }
            }
        }

        Ok(self.transition())
    }
}

pub struct PublisherHandle {
    task: JoinHandle<()>,
}

impl PublisherHandle {
    pub fn spawn(
        decoder: Arc<FrameDecoder>,
        event_sender: mpsc::Sender<ButtonEvent>,
        sample_hz: u32,
        cancel: CancellationToken,
    ) -> Self {
        let period = sample_period(sample_hz);
        info!("Spawning change publisher at {} Hz", sample_hz);

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut publisher = ChangePublisher::create(decoder.clone(), event_sender);
            let mut ticks: u64 = 0;
            let mut emitted: u64 = 0;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                publisher = match publisher.sample().publish() {
                    Ok(next) => {
                        emitted = next.emitted();
                        next
                    }
                    Err(e) => {
                        warn!("Change publisher stopping: {}", e);
                        break;
                    }
                };

                ticks += 1;
                if ticks % STATS_EVERY_TICKS == 0 {
                    debug!("Frame stats: {:?}", decoder.stats());
                }
            }
            info!(
                "Change publisher stopped after {} events, frame stats {:?}",
                emitted,
                decoder.stats()
            );
        });

        Self { task }
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("Change publisher task failed: {}", e);
        }
    }
}
