use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of serial positions in a pad frame
pub const FRAME_BITS: usize = 12;

/// Mask covering every valid button bit
const BUTTON_MASK: u16 = (1 << FRAME_BITS) - 1;

/// Pad buttons in wire order: position `i` of a frame carries `Button::ALL[i]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Button {
    B,
    Y,
    Select,
    Start,
    Up,
    Down,
    Left,
    Right,
    A,
    X,
    L,
    R,
}

impl Button {
    pub const ALL: [Button; FRAME_BITS] = [
        Button::B,
        Button::Y,
        Button::Select,
        Button::Start,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::A,
        Button::X,
        Button::L,
        Button::R,
    ];

    /// Frame position of this button
    pub fn position(self) -> usize {
        self as usize
    }

    pub fn from_position(position: usize) -> Option<Button> {
        Self::ALL.get(position).copied()
    }

    fn bit(self) -> u16 {
        1 << self.position()
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Button::B => "B",
            Button::Y => "Y",
            Button::Select => "Select",
            Button::Start => "Start",
            Button::Up => "Up",
            Button::Down => "Down",
            Button::Left => "Left",
            Button::Right => "Right",
            Button::A => "A",
            Button::X => "X",
            Button::L => "L",
            Button::R => "R",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown button `{0}`")]
pub struct UnknownButton(pub String);

impl FromStr for Button {
    type Err = UnknownButton;

    /// Case-insensitive button name as printed by `Display`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Button::ALL
            .into_iter()
            .find(|b| b.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownButton(s.to_string()))
    }
}

/// Set of pressed buttons, one bit per frame position
///
/// Bit `i` set means `Button::ALL[i]` is held. This is the inverse of the wire
/// encoding, which is active-low.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ButtonState(u16);

impl ButtonState {
    pub const EMPTY: ButtonState = ButtonState(0);

    /// Decode a complete frame of raw line samples (active-low)
    ///
    /// `samples` holds the sample of position `i` in bit `i`.
    pub fn from_samples(samples: u16) -> Self {
        ButtonState(!samples & BUTTON_MASK)
    }

    /// Decode a frame given as sampled line levels in wire order
    pub fn from_frame(frame: &[bool; FRAME_BITS]) -> Self {
        let samples = frame
            .iter()
            .enumerate()
            .fold(0u16, |acc, (i, &high)| acc | (u16::from(high) << i));
        Self::from_samples(samples)
    }

    pub fn from_bits(bits: u16) -> Self {
        ButtonState(bits & BUTTON_MASK)
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn contains(self, button: Button) -> bool {
        self.0 & button.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    #[must_use]
    pub fn with(self, button: Button) -> Self {
        ButtonState(self.0 | button.bit())
    }

    /// Buttons held in `self` but not in `other`
    pub fn difference(self, other: ButtonState) -> ButtonState {
        ButtonState(self.0 & !other.0)
    }

    /// Held buttons in wire order
    pub fn iter(self) -> impl Iterator<Item = Button> {
        Button::ALL.into_iter().filter(move |b| self.contains(*b))
    }
}

impl FromIterator<Button> for ButtonState {
    fn from_iter<I: IntoIterator<Item = Button>>(iter: I) -> Self {
        iter.into_iter().fold(ButtonState::EMPTY, ButtonState::with)
    }
}

impl fmt::Debug for ButtonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Change between two consecutive button snapshots
#[derive(Clone, Debug, PartialEq)]
pub struct ButtonEvent {
    pub pressed: Vec<Button>,
    pub released: Vec<Button>,
    /// Snapshot the delta leads to
    pub state: ButtonState,
    pub timestamp: DateTime<Local>,
}

impl ButtonEvent {
    /// Delta from `previous` to `current`, or `None` when nothing changed
    pub fn between(
        previous: ButtonState,
        current: ButtonState,
        timestamp: DateTime<Local>,
    ) -> Option<Self> {
        if previous == current {
            return None;
        }
        Some(Self {
            pressed: current.difference(previous).iter().collect(),
            released: previous.difference(current).iter().collect(),
            state: current,
            timestamp,
        })
    }
}
