//! Cascade Lake-SP CHA register map
//!
//! Same register layout as Skylake-SP with four more boxes per die.

use super::cha::{BoxOffsets, ChaCounterControl, GlobalControl, StateFilter, UnitReset};
use super::skylake::{
    legacy_control, LEGACY_GLOBAL, LEGACY_OFFSETS, LEGACY_RESET, LEGACY_STATE_FILTER,
};
use super::{ChaProfile, Generation};

#[derive(Debug, Clone, Copy, Default)]
pub struct CascadeLakeCha;

impl ChaProfile for CascadeLakeCha {
    fn generation(&self) -> Generation {
        Generation::CascadeLake
    }

    fn max_sockets(&self) -> usize {
        4
    }

    fn box_count(&self) -> usize {
        28
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
        "events/cha_events_clx_parsed.json"
    }

    fn offset_log(&self) -> &'static str {
        "cha_map_clx_mammoth.log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_box_addresses() {
        let clx = CascadeLakeCha;
        assert_eq!(clx.box_ctl(27), 0xFB0);
        assert_eq!(clx.counter_value(27, 0), 0xFB8);
        assert_eq!(clx.global_control().freeze, 1 << 63);
    }
}
