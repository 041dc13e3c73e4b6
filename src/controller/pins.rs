//! GPIO binding of the three pad lines
//!
//! Latch and Clock are registered as async interrupts; rppal runs each
//! interrupt callback on its own thread. The Data pin is moved into the clock
//! callback so it can be sampled right at the falling edge.

use super::frame_decoder::FrameDecoder;
use rppal::gpio::{Event, Gpio, InputPin, Trigger};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// BCM pin numbers of the pad lines
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PinAssignment {
    pub clock: u8,
    pub latch: u8,
    pub data: u8,
}

impl Default for PinAssignment {
    fn default() -> Self {
        Self {
            clock: 17,
            latch: 27,
            data: 22,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PinError {
    #[error("GPIO controller unavailable: {0}")]
    Unavailable(#[source] rppal::gpio::Error),

    #[error("Failed to claim {line} line on GPIO {pin}: {source}")]
    Claim {
        line: &'static str,
        pin: u8,
        #[source]
        source: rppal::gpio::Error,
    },

    #[error("Failed to register {line} interrupt on GPIO {pin}: {source}")]
    Interrupt {
        line: &'static str,
        pin: u8,
        #[source]
        source: rppal::gpio::Error,
    },

    #[error("Pin assignment reuses GPIO {0} for more than one line")]
    Duplicate(u8),
}

/// Claimed pad lines with edge interrupts feeding a [`FrameDecoder`]
///
/// Dropping the binding releases the interrupts as well; [`PadLines::release`]
/// does the same explicitly and logs it.
pub struct PadLines<L: EdgeLine = InputPin> {
    assignment: PinAssignment,
    latch: L,
    clock: L,
    armed: bool,
}

/// A line whose edge interrupt can be unregistered
pub trait EdgeLine {
    fn clear_interrupt(&mut self) -> rppal::gpio::Result<()>;
}

impl EdgeLine for InputPin {
    fn clear_interrupt(&mut self) -> rppal::gpio::Result<()> {
        self.clear_async_interrupt()
    }
}

impl PadLines {
    pub fn claim(assignment: PinAssignment, decoder: Arc<FrameDecoder>) -> Result<Self, PinError> {
        let PinAssignment { clock, latch, data } = assignment;
        if clock == latch || clock == data || latch == data {
            let dup = if clock == latch || clock == data { clock } else { latch };
            return Err(PinError::Duplicate(dup));
        }

        let gpio = Gpio::new().map_err(PinError::Unavailable)?;
        let claim = |line: &'static str, pin: u8| {
            gpio.get(pin)
                .map(|p| p.into_input())
                .map_err(|source| PinError::Claim { line, pin, source })
        };

        let mut latch_pin = claim("latch", latch)?;
        let mut clock_pin = claim("clock", clock)?;
        let data_pin = claim("data", data)?;
        debug!("Claimed pad lines: {:?}", assignment);

        let latch_decoder = decoder.clone();
        latch_pin
            .set_async_interrupt(Trigger::RisingEdge, None, move |_: Event| {
                latch_decoder.on_latch_rise();
            })
            .map_err(|source| PinError::Interrupt {
                line: "latch",
                pin: latch,
                source,
            })?;

        clock_pin
            .set_async_interrupt(Trigger::FallingEdge, None, move |_: Event| {
                decoder.on_clock_fall(&data_pin);
            })
            .map_err(|source| PinError::Interrupt {
                line: "clock",
                pin: clock,
                source,
            })?;

        info!(
            "Pad lines armed: clock=GPIO{} latch=GPIO{} data=GPIO{}",
            clock, latch, data
        );
        Ok(Self {
            assignment,
            latch: latch_pin,
            clock: clock_pin,
            armed: true,
        })
    }
}

impl<L: EdgeLine> PadLines<L> {
    pub fn release(mut self) {
        self.clear_interrupts();
        info!("Released pad lines {:?}", self.assignment);
    }

    /// Runs once; later calls find the interrupts already gone
    fn clear_interrupts(&mut self) {
        if !std::mem::replace(&mut self.armed, false) {
            return;
        }
        if let Err(e) = self.latch.clear_interrupt() {
            warn!("Failed to clear latch interrupt: {}", e);
        }
        if let Err(e) = self.clock.clear_interrupt() {
            warn!("Failed to clear clock interrupt: {}", e);
        }
    }
}

impl<L: EdgeLine> Drop for PadLines<L> {
    fn drop(&mut self) {
        self.clear_interrupts();
    }
}
