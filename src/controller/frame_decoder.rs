//! Frame Decoder - edge-driven reconstruction of pad frames
//!
//! The pad shifts out one bit per clock after every latch pulse:
//!
//! ```text
//! Latch  ─┐▔▔┌───────────────────────────────────────────
//! Clock  ──────▔▔┐_┌▔┐_┌▔┐_┌ ... ▔┐_┌▔▔▔▔▔▔▔▔▔▔▔▔▔▔▔▔▔▔▔
//! Data   ══════════X═══X═══X ...  ═X══════════════════
//!                 bit0 bit1 bit2    bit11
//! ```
//!
//! Both edge callbacks run on interrupt threads and only touch atomics. The
//! in-progress frame lives in a single `AtomicU32`, so a latch reset racing a
//! clock sample can never leave a torn frame behind.

use super::buttons::{ButtonState, FRAME_BITS};
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};

// In-progress frame layout: samples in bits 0..12, sample count in bits 16..21,
// bit 31 set once the frame overran and is being discarded.
const SAMPLE_MASK: u32 = (1 << FRAME_BITS) - 1;
const COUNT_SHIFT: u32 = 16;
const COUNT_MASK: u32 = 0x1F;
const OVERRUN: u32 = 1 << 31;

/// A line that can be sampled for its current level
pub trait SignalLine {
    fn is_high(&self) -> bool;
}

impl SignalLine for rppal::gpio::InputPin {
    fn is_high(&self) -> bool {
        rppal::gpio::InputPin::is_high(self)
    }
}

impl SignalLine for bool {
    fn is_high(&self) -> bool {
        *self
    }
}

/// Frame counters, read for diagnostics only
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames that reached 12 samples and were published
    pub complete: u64,
    /// Non-empty frames cut short by a latch pulse
    pub short: u64,
    /// Frames that received a 13th sample (framing errors)
    pub overrun: u64,
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    frame: AtomicU32,
    current: AtomicU16,
    complete: AtomicU64,
    short: AtomicU64,
    overrun: AtomicU64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch rising edge: start a new frame, dropping whatever was collected
    pub fn on_latch_rise(&self) {
        let previous = self.frame.swap(0, Ordering::AcqRel);
        let count = (previous >> COUNT_SHIFT) & COUNT_MASK;
        if previous & OVERRUN == 0 && count > 0 && (count as usize) < FRAME_BITS {
            self.short.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Clock falling edge: sample `data` into the frame
    pub fn on_clock_fall<L: SignalLine + ?Sized>(&self, data: &L) {
        let high = data.is_high();
        let update = self
            .frame
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |frame| {
                if frame & OVERRUN != 0 {
                    return None;
                }
                let count = (frame >> COUNT_SHIFT) & COUNT_MASK;
                if count as usize >= FRAME_BITS {
                    Some(OVERRUN)
                } else {
                    Some((frame | u32::from(high) << count) + (1 << COUNT_SHIFT))
                }
            });

        // Err means the frame is already discarded; wait for the next latch
        let Ok(previous) = update else {
            return;
        };

        let count = ((previous >> COUNT_SHIFT) & COUNT_MASK) as usize;
        if count == FRAME_BITS - 1 {
            let samples = (previous | u32::from(high) << count) & SAMPLE_MASK;
            self.current
                .store(ButtonState::from_samples(samples as u16).bits(), Ordering::Release);
            self.complete.fetch_add(1, Ordering::Relaxed);
        } else if count >= FRAME_BITS {
            self.overrun.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Most recently published complete frame
    pub fn current(&self) -> ButtonState {
        ButtonState::from_bits(self.current.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> FrameStats {
        FrameStats {
            complete: self.complete.load(Ordering::Relaxed),
            short: self.short.load(Ordering::Relaxed),
            overrun: self.overrun.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::buttons::Button;

    fn clock_in(decoder: &FrameDecoder, bits: &[bool]) {
        for bit in bits {
            decoder.on_clock_fall(bit);
        }
    }

    #[test]
    fn twelve_samples_publish_state() {
        let decoder = FrameDecoder::new();
        decoder.on_latch_rise();
        clock_in(
            &decoder,
            &[true, true, true, true, false, true, true, true, true, true, true, true],
        );
        assert_eq!(decoder.current(), ButtonState::EMPTY.with(Button::Up));
        assert_eq!(decoder.stats().complete, 1);
    }

    #[test]
    fn nothing_published_before_twelfth_sample() {
        let decoder = FrameDecoder::new();
        decoder.on_latch_rise();
        clock_in(&decoder, &[false; 11]);
        assert!(decoder.current().is_empty());
        assert_eq!(decoder.stats().complete, 0);
    }

    #[test]
    fn latch_discards_partial_frame() {
        let decoder = FrameDecoder::new();
        decoder.on_latch_rise();
        clock_in(&decoder, &[true; FRAME_BITS]);
        let before = decoder.current();

        decoder.on_latch_rise();
        clock_in(&decoder, &[false; 7]);
        decoder.on_latch_rise();

        assert_eq!(decoder.current(), before);
        assert_eq!(decoder.stats().short, 1);
        assert_eq!(decoder.stats().overrun, 0);
    }

    #[test]
    fn empty_latch_is_not_counted_as_short() {
        let decoder = FrameDecoder::new();
        decoder.on_latch_rise();
        decoder.on_latch_rise();
        assert_eq!(decoder.stats(), FrameStats::default());
    }

    #[test]
    fn thirteenth_sample_counts_one_framing_error() {
        let decoder = FrameDecoder::new();
        decoder.on_latch_rise();
        clock_in(&decoder, &[true; FRAME_BITS]);
        clock_in(&decoder, &[false; 4]);

        let stats = decoder.stats();
        assert_eq!(stats.complete, 1);
        assert_eq!(stats.overrun, 1);
        assert!(decoder.current().is_empty());
    }

    #[test]
    fn decoder_resyncs_after_overrun() {
        let decoder = FrameDecoder::new();
        decoder.on_latch_rise();
        clock_in(&decoder, &[true; FRAME_BITS + 1]);

        decoder.on_latch_rise();
        let mut frame = [true; FRAME_BITS];
        frame[Button::A.position()] = false;
        clock_in(&decoder, &frame);

        assert_eq!(decoder.current(), ButtonState::EMPTY.with(Button::A));
        assert_eq!(decoder.stats().complete, 2);
    }

    #[test]
    fn clock_before_first_latch_still_frames() {
        // A decoder attached mid-frame collects garbage until the first latch;
        // the first latch after that must resync cleanly.
        let decoder = FrameDecoder::new();
        clock_in(&decoder, &[false; 5]);
        decoder.on_latch_rise();
        clock_in(&decoder, &[true; FRAME_BITS]);
        assert!(decoder.current().is_empty());
        assert_eq!(decoder.stats().short, 1);
    }
}
