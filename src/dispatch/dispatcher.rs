//! Key Dispatcher - one action per debounced button press
//!
//! # State Machine (per button, stepped once per sampled frame)
//!
//! ```text
//!            press_frames pressed in a row
//!  Idle ────────────────────────────────────► fire, Cooldown
//!   ▲                                               │ cooldown elapsed
//!   │     release_frames released in a row          ▼
//!   └─────────────────────────────────────── WaitRelease
//! ```
//!
//! Any frame that breaks a run resets its counter. Cooldown ignores the
//! button entirely, so holding it past the cooldown never repeats.

use super::handoff::{Handoff, HandoffWriter};
use super::keymap::{Action, Keymap};
use crate::controller::{Button, ButtonEvent, ButtonState, FRAME_BITS};
use crate::lights::LightSwitch;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_COOLDOWN: Duration = Duration::from_millis(400);
pub const DEFAULT_PRESS_FRAMES: u32 = 4;
pub const DEFAULT_RELEASE_FRAMES: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Idle { pressed: u32 },
    Cooldown { until: Instant },
    WaitRelease { released: u32 },
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Idle { pressed: 0 }
    }
}

/// Per-button press debouncing
#[derive(Debug)]
pub struct PressGate {
    cooldown: Duration,
    press_frames: u32,
    release_frames: u32,
    phases: [Phase; FRAME_BITS],
}

impl PressGate {
    /// Frame thresholds below one are treated as one
    pub fn new(cooldown: Duration, press_frames: u32, release_frames: u32) -> Self {
        Self {
            cooldown,
            press_frames: press_frames.max(1),
            release_frames: release_frames.max(1),
            phases: [Phase::default(); FRAME_BITS],
        }
    }

    /// Step every button with one sampled frame; returns the buttons that
    /// fire on it, in wire order
    pub fn observe(&mut self, state: ButtonState, now: Instant) -> Vec<Button> {
        Button::ALL
            .into_iter()
            .filter(|&button| self.step(button, state.contains(button), now))
            .collect()
    }

    fn step(&mut self, button: Button, pressed: bool, now: Instant) -> bool {
        let phase = &mut self.phases[button.position()];
        let (next, fire) = match *phase {
            Phase::Idle { pressed: count } if pressed => {
                if count + 1 >= self.press_frames {
                    (Phase::Cooldown { until: now + self.cooldown }, true)
                } else {
                    (Phase::Idle { pressed: count + 1 }, false)
                }
            }
            Phase::Idle { .. } => (Phase::Idle { pressed: 0 }, false),
            Phase::Cooldown { until } if now >= until => (Phase::WaitRelease { released: 0 }, false),
            cooling @ Phase::Cooldown { .. } => (cooling, false),
            Phase::WaitRelease { .. } if pressed => (Phase::WaitRelease { released: 0 }, false),
            Phase::WaitRelease { released } => {
                if released + 1 >= self.release_frames {
                    (Phase::Idle { pressed: 0 }, false)
                } else {
                    (Phase::WaitRelease { released: released + 1 }, false)
                }
            }
        };
        *phase = next;
        fire
    }
}

pub struct KeyDispatcher {
    keymap: Keymap,
    gate: PressGate,
    sample_period: Duration,
}

impl KeyDispatcher {
    /// `sample_period` is how often the held buttons are fed to `gate`,
    /// normally the controller's sampling period
    pub fn new(keymap: Keymap, gate: PressGate, sample_period: Duration) -> Self {
        Self {
            keymap,
            gate,
            sample_period,
        }
    }

    /// Actions fired by one sampled frame
    pub fn on_frame(&mut self, state: ButtonState, now: Instant) -> Vec<(Button, Action)> {
        self.gate
            .observe(state, now)
            .into_iter()
            .filter_map(|button| self.keymap.action(button).map(|a| (button, a.clone())))
            .collect()
    }

    /// Run actions for incoming events until `cancel` fires or `events` closes
    ///
    /// Events only carry changes, so the last reported state is replayed to
    /// the gate every sample period.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<ButtonEvent>,
        mut writer: HandoffWriter,
        mut lights: Option<LightSwitch>,
        cancel: CancellationToken,
    ) -> (HandoffWriter, Option<LightSwitch>) {
        info!("Key dispatcher running every {:?}", self.sample_period);
        let mut ticker = interval(self.sample_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut held = ButtonState::EMPTY;

        loop {
            let now = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => {
                        debug!("Buttons held: {:?}", event.state);
                        held = event.state;
                        continue;
                    }
                    None => break,
                },
                now = ticker.tick() => now,
            };

            for (button, action) in self.on_frame(held, now) {
                match action {
                    Action::Key(token) => {
                        let outcome = writer.write(&token).await;
                        info!("Pressed {} → {} ({:?})", button, token, outcome);
                        if outcome == Handoff::NoReader {
                            debug!("Forwarder not listening");
                        }
                    }
                    Action::ToggleLight(light) => match lights.as_mut() {
                        Some(switch) => {
                            switch.toggle(light);
                        }
                        None => debug!("Pressed {}: lights not configured", button),
                    },
                }
            }
        }
        info!("Key dispatcher stopped");
        (writer, lights)
    }
}
