use proptest::prelude::*;
use snes_link::controller::{Button, ButtonEvent, ButtonState, FrameDecoder, FRAME_BITS};

fn clock_frame(decoder: &FrameDecoder, bits: &[bool]) {
    decoder.on_latch_rise();
    for bit in bits {
        decoder.on_clock_fall(bit);
    }
}

proptest! {
    // Any complete frame decodes position by position, active-low
    #[test]
    fn complete_frame_decodes_active_low(bits in prop::array::uniform12(any::<bool>())) {
        let decoder = FrameDecoder::new();
        clock_frame(&decoder, &bits);

        let state = decoder.current();
        for (i, button) in Button::ALL.iter().enumerate() {
            prop_assert_eq!(state.contains(*button), !bits[i]);
        }
        prop_assert_eq!(decoder.stats().complete, 1);
    }

    // Decoding is a pure function of the samples
    #[test]
    fn decoding_is_pure(bits in prop::array::uniform12(any::<bool>())) {
        prop_assert_eq!(ButtonState::from_frame(&bits), ButtonState::from_frame(&bits));

        let decoder = FrameDecoder::new();
        clock_frame(&decoder, &bits);
        clock_frame(&decoder, &bits);
        prop_assert_eq!(decoder.current(), ButtonState::from_frame(&bits));
    }

    // A frame cut short never replaces the published state
    #[test]
    fn partial_frame_keeps_previous_state(
        first in prop::array::uniform12(any::<bool>()),
        partial in prop::collection::vec(any::<bool>(), 1..FRAME_BITS),
    ) {
        let decoder = FrameDecoder::new();
        clock_frame(&decoder, &first);
        clock_frame(&decoder, &partial);
        decoder.on_latch_rise();

        prop_assert_eq!(decoder.current(), ButtonState::from_frame(&first));
        prop_assert_eq!(decoder.stats().short, 1);
        prop_assert_eq!(decoder.stats().overrun, 0);
    }

    // However many extra clocks arrive, one framing error per frame
    #[test]
    fn overrun_counts_once_per_frame(
        bits in prop::collection::vec(any::<bool>(), FRAME_BITS + 1..FRAME_BITS * 4),
        frames in 1usize..5,
    ) {
        let decoder = FrameDecoder::new();
        for _ in 0..frames {
            clock_frame(&decoder, &bits);
        }
        decoder.on_latch_rise();

        let stats = decoder.stats();
        prop_assert_eq!(stats.overrun, frames as u64);
        prop_assert_eq!(stats.short, 0);
        // The 12th sample already published before the overrun
        let first_twelve: [bool; FRAME_BITS] = bits[..FRAME_BITS].try_into().unwrap();
        prop_assert_eq!(decoder.current(), ButtonState::from_frame(&first_twelve));
    }

    // Events describe exactly the symmetric difference of two snapshots
    #[test]
    fn events_cover_exactly_the_changes(a in 0u16..0x1000, b in 0u16..0x1000) {
        let (prev, cur) = (ButtonState::from_bits(a), ButtonState::from_bits(b));
        match ButtonEvent::between(prev, cur, chrono::Local::now()) {
            None => prop_assert_eq!(prev, cur),
            Some(event) => {
                prop_assert_eq!(event.state, cur);
                for button in Button::ALL {
                    let pressed = event.pressed.contains(&button);
                    let released = event.released.contains(&button);
                    prop_assert_eq!(pressed, cur.contains(button) && !prev.contains(button));
                    prop_assert_eq!(released, prev.contains(button) && !cur.contains(button));
                }
            }
        }
    }
}
