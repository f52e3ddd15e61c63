//! Ice Lake-SP CHA register map
//!
//! Boxes are spaced 0xE apart and split over three address ranges; boxes 34
//! and up live below box 0.

use super::cha::{BoxOffsets, ChaCounterControl, GlobalControl, UnitReset, LLC_LOOKUP_EVENT};
use super::skylake::{legacy_control, LEGACY_GLOBAL, LEGACY_OFFSETS, LEGACY_RESET};
use super::{ChaProfile, Generation};

const BOX_STRIDE: u64 = 0xE;

/// Opcode match programmed with LLC lookup events
const LLC_LOOKUP_EXT: u32 = 0x1BC1;

#[derive(Debug, Clone, Copy, Default)]
pub struct IceLakeCha;

impl ChaProfile for IceLakeCha {
    fn generation(&self) -> Generation {
        Generation::IceLake
    }

    fn max_sockets(&self) -> usize {
        2
    }

    fn box_count(&self) -> usize {
        40
    }

    fn global_control(&self) -> GlobalControl {
        LEGACY_GLOBAL
    }

    fn box_base(&self, cha: usize) -> u64 {
        let cha = cha as u64;
        match cha {
            0..=17 => 0xE00 + BOX_STRIDE * cha,
            18..=33 => 0xF0A + BOX_STRIDE * (cha - 18),
            _ => 0xB60 + BOX_STRIDE * (cha - 34),
        }
    }

    fn box_offsets(&self) -> BoxOffsets {
        LEGACY_OFFSETS
    }

    fn unit_reset(&self) -> UnitReset {
        LEGACY_RESET
    }

    fn encode_control(&self, event_code: u32, umask: u32) -> ChaCounterControl {
        let mut control = legacy_control(event_code, umask);
        if event_code == LLC_LOOKUP_EVENT {
            control.unit_mask_ext = LLC_LOOKUP_EXT;
        }
        control
    }

    fn catalog_path(&self) -> &'static str {
        "events/cha_events_icx_parsed.json"
    }

    fn offset_log(&self) -> &'static str {
        "cha_map_icx_mammoth.log"
    }
}
