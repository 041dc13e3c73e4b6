//! Button presses to actions on the reader side
//!
//! - [`keymap`] - button to action bindings
//! - [`dispatcher`] - press debouncing and the dispatch loop
//! - [`handoff`] - FIFO writer feeding the forwarder process

pub mod dispatcher;
pub mod handoff;
pub mod keymap;

pub use dispatcher::{
    KeyDispatcher, PressGate, DEFAULT_COOLDOWN, DEFAULT_PRESS_FRAMES, DEFAULT_RELEASE_FRAMES,
};
pub use handoff::{Handoff, HandoffWriter};
pub use keymap::{Action, Keymap};

use crate::controller::UnknownButton;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Bad key binding: {0}")]
    Binding(#[from] UnknownButton),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub cooldown_ms: u64,

    /// Consecutive pressed frames before a press fires
    pub press_frames: u32,

    /// Consecutive released frames before a button can fire again
    pub release_frames: u32,

    /// Per-button overrides, e.g. `Select = "KEYCODE_HOME"`
    pub keys: BTreeMap<String, Action>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN.as_millis() as u64,
            press_frames: DEFAULT_PRESS_FRAMES,
            release_frames: DEFAULT_RELEASE_FRAMES,
            keys: BTreeMap::new(),
        }
    }
}

impl DispatchSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn keymap(&self) -> Result<Keymap, DispatchError> {
        Ok(Keymap::default().with_overrides(&self.keys)?)
    }

    pub fn gate(&self) -> PressGate {
        PressGate::new(self.cooldown(), self.press_frames, self.release_frames)
    }

    /// Dispatcher stepping its gate once per `sample_period`
    pub fn dispatcher(&self, sample_period: Duration) -> Result<KeyDispatcher, DispatchError> {
        Ok(KeyDispatcher::new(self.keymap()?, self.gate(), sample_period))
    }
}
