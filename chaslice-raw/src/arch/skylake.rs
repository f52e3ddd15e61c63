//! Skylake-SP CHA register map
//!
//! Reference: Intel Xeon Processor Scalable Memory Family Uncore Performance
//! Monitoring Reference Manual, section 2.2.

use super::cha::{
    BoxOffsets, ChaCounterControl, GlobalControl, StateFilter, UnitReset, LLC_LOOKUP_EVENT,
};
use super::{ChaProfile, Generation};

/// Global uncore control shared by Skylake, Cascade Lake and Ice Lake
pub(crate) const LEGACY_GLOBAL: GlobalControl = GlobalControl {
    control: 0x700,
    status: 0x701,
    freeze: 1 << 63,
    unfreeze: 1 << 61,
};

pub(crate) const LEGACY_OFFSETS: BoxOffsets = BoxOffsets {
    status: 0x7,
    ctl0: 0x1,
    ctr0: 0x8,
    filter0: 0x5,
    filter1: 0x6,
};

pub(crate) const LEGACY_RESET: UnitReset = UnitReset {
    control_bit: 0,
    counters_bit: 1,
};

/// FMESI: count lookups hitting any coherence state
pub(crate) const LEGACY_STATE_FILTER: StateFilter = StateFilter {
    trigger_event: LLC_LOOKUP_EVENT,
    all_states: 0x01E2_0000,
    clear: 0x200,
};

/// Event select, umask and enable; the layout used before Ice Lake
pub(crate) fn legacy_control(event_code: u32, umask: u32) -> ChaCounterControl {
    ChaCounterControl {
        event_select: (event_code & 0xFF) as u8,
        unit_mask: (umask & 0xFF) as u8,
        enable: true,
        ..Default::default()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SkylakeCha;

impl ChaProfile for SkylakeCha {
    fn generation(&self) -> Generation {
        Generation::Skylake
    }

    fn max_sockets(&self) -> usize {
        4
    }

    fn box_count(&self) -> usize {
        24
    }

    fn global_control(&self) -> GlobalControl {
        LEGACY_GLOBAL
    }

    fn box_base(&self, cha: usize) -> u64 {
        0xE00 + 0x10 * cha as u64
    }

    fn box_offsets(&self) -> BoxOffsets {
        LEGACY_OFFSETS
    }

    fn unit_reset(&self) -> UnitReset {
        LEGACY_RESET
    }

    fn encode_control(&self, event_code: u32, umask: u32) -> ChaCounterControl {
        legacy_control(event_code, umask)
    }

    fn state_filter(&self) -> Option<StateFilter> {
        Some(LEGACY_STATE_FILTER)
    }

    fn catalog_path(&self) -> &'static str {
        "cha_events_skx.json"
    }

    fn offset_log(&self) -> &'static str {
        "cha_map_skx.log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::RegisterLayout;

    #[test]
    fn test_register_addresses() {
        let skx = SkylakeCha;
        assert_eq!(skx.box_ctl(0), 0xE00);
        assert_eq!(skx.box_status(0), 0xE07);
        assert_eq!(skx.counter_ctl(1, 0), 0xE11);
        assert_eq!(skx.counter_ctl(1, 3), 0xE14);
        assert_eq!(skx.counter_value(23, 3), 0xF7B);
        assert_eq!(skx.filter0(2), 0xE25);
        assert_eq!(skx.filter1(2), 0xE26);
    }

    #[test]
    fn test_control_word() {
        let word = SkylakeCha.encode_control(0x34, 0x11).to_msr_value();
        assert_eq!(word, 0x0040_1134);
        assert_eq!(
            SkylakeCha.state_filter().map(|f| f.value_for(0x34)),
            Some(0x01E2_0000)
        );
    }
}
