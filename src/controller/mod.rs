//! Pad input subsystem
//!
//! Implements the reader half of the bridge:
//!
//! 1. [`pins`] - GPIO claim and edge interrupts
//! 2. [`frame_decoder`] - Latch/clock framing and active-low decoding
//! 3. [`change_publisher`] - Fixed cadence sampling and change detection
//! 4. [`controller_handle`] - Unified API and lifecycle management
//!
//! # Architecture
//!
//! ```text
//! GPIO ──► FrameDecoder ──► ChangePublisher ──► ButtonEvent
//!          (per edge)       (60 Hz)
//! ```

pub mod buttons;
pub mod change_publisher;
pub mod controller_handle;
pub mod frame_decoder;
pub mod pins;

pub use buttons::{Button, ButtonEvent, ButtonState, UnknownButton, FRAME_BITS};
pub use controller_handle::{ControllerError, ControllerHandle, ControllerSettings};
pub use frame_decoder::{FrameDecoder, FrameStats, SignalLine};
