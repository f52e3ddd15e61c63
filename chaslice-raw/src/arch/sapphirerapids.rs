//! Sapphire Rapids CHA register map
//!
//! The uncore discovery table moved every CHA register above 0x2000. Counter
//! control has no enable bit and takes the high umask byte in bits 32 and up.

use super::cha::{BoxOffsets, ChaCounterControl, GlobalControl, UnitReset};
use super::{ChaProfile, Generation};

#[derive(Debug, Clone, Copy, Default)]
pub struct SapphireRapidsCha;

impl ChaProfile for SapphireRapidsCha {
    fn generation(&self) -> Generation {
        Generation::SapphireRapids
    }

    fn max_sockets(&self) -> usize {
        4
    }

    fn box_count(&self) -> usize {
        28
    }

    fn global_control(&self) -> GlobalControl {
        GlobalControl {
            control: 0x2FF0,
            status: 0x2FF2,
            freeze: 1,
            unfreeze: 0,
        }
    }

    fn box_base(&self, cha: usize) -> u64 {
        0x2000 + 0x10 * cha as u64
    }

    fn box_offsets(&self) -> BoxOffsets {
        BoxOffsets {
            status: 0x1,
            ctl0: 0x2,
            ctr0: 0x8,
            filter0: 0xE,
            filter1: 0x6,
        }
    }

    fn unit_reset(&self) -> UnitReset {
        UnitReset {
            control_bit: 8,
            counters_bit: 9,
        }
    }

    fn encode_control(&self, event_code: u32, umask: u32) -> ChaCounterControl {
        ChaCounterControl {
            event_select: (event_code & 0xFF) as u8,
            unit_mask: (umask & 0xFF) as u8,
            unit_mask_ext: umask >> 8,
            ..Default::default()
        }
    }

    fn catalog_path(&self) -> &'static str {
        "events/cha_events_spr_parsed.json"
    }

    fn offset_log(&self) -> &'static str {
        "cha_map_spr.log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::register::RegisterLayout;

    #[test]
    fn test_register_addresses() {
        let spr = SapphireRapidsCha;
        assert_eq!(spr.box_ctl(1), 0x2010);
        assert_eq!(spr.box_status(1), 0x2011);
        assert_eq!(spr.counter_ctl(1, 0), 0x2012);
        assert_eq!(spr.counter_ctl(1, 3), 0x2015);
        assert_eq!(spr.counter_value(1, 3), 0x201B);
        assert_eq!(spr.filter0(1), 0x201E);
        assert_eq!(spr.unit_reset().pattern(), 0x300);
    }

    #[test]
    fn test_wide_umask_encoding() {
        let word = SapphireRapidsCha.encode_control(0x35, 0x00C8_1FFF).to_msr_value();
        assert_eq!(word & 0xFF, 0x35);
        assert_eq!((word >> 8) & 0xFF, 0xFF);
        assert_eq!(word >> 32, 0x00C8_1F);
        assert_eq!(word & (1 << 22), 0);
    }
}
